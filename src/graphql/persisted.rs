//! Persisted-query store: a lookup from a client-supplied SHA-256 hash to
//! previously registered operation text, letting clients send the hash
//! instead of the full query body on repeat requests.

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[derive(Default)]
pub struct PersistedQueryStore {
    by_hash: RwLock<HashMap<String, String>>,
}

impl PersistedQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_of(query: &str) -> String {
        hex::encode(Sha256::digest(query.as_bytes()))
    }

    /// Registers `query` under its own hash and returns that hash.
    pub fn register(&self, query: &str) -> String {
        let hash = Self::hash_of(query);
        self.by_hash.write().insert(hash.clone(), query.to_string());
        hash
    }

    /// Registers `query` under a client-asserted `hash`, rejecting the
    /// registration if the hash doesn't match (APQ's "hash mismatch"
    /// rule — a client can't poison the store with an arbitrary key).
    pub fn register_with_hash(&self, hash: &str, query: &str) -> Result<(), HashMismatch> {
        if Self::hash_of(query) != hash {
            return Err(HashMismatch);
        }
        self.by_hash.write().insert(hash.to_string(), query.to_string());
        Ok(())
    }

    pub fn get(&self, hash: &str) -> Option<String> {
        self.by_hash.read().get(hash).cloned()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.by_hash.read().contains_key(hash)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct HashMismatch;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_looks_up_by_hash() {
        let store = PersistedQueryStore::new();
        let hash = store.register("{ me { id } }");
        assert_eq!(store.get(&hash).as_deref(), Some("{ me { id } }"));
    }

    #[test]
    fn unknown_hash_misses() {
        let store = PersistedQueryStore::new();
        assert!(store.get("deadbeef").is_none());
    }

    #[test]
    fn client_asserted_hash_must_match_the_query_text() {
        let store = PersistedQueryStore::new();
        assert_eq!(store.register_with_hash("wrong", "{ me }"), Err(HashMismatch));
        assert!(!store.contains("wrong"));
        let real_hash = PersistedQueryStore::hash_of("{ me }");
        assert!(store.register_with_hash(&real_hash, "{ me }").is_ok());
    }
}
