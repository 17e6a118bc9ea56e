//! Static + parameterized route matcher.
//!
//! Routes are kept in a trie over `/`-separated segments, one trie per HTTP
//! method. At each node, static children are tried before the wildcard
//! child, which guarantees a literal segment wins over a `{name}` segment
//! at the same depth — the router's core precedence invariant.

use crate::{
    errors::{ErrorKind, RoutingError},
    http::types::Method,
};
use std::collections::HashMap;

/// Maximum `{name}` captures permitted in a single route pattern; bounds the
/// param array to a fixed, stack-sized capacity.
pub const MAX_PARAMS: usize = 8;

/// A captured path parameter: the `{name}` and the raw, undecoded segment
/// matched against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param<'a> {
    pub name: &'a str,
    pub value: &'a [u8],
}

/// Fixed-capacity parameter list returned by a successful match.
#[derive(Debug, Default)]
pub struct ParamList<'a> {
    params: [Option<Param<'a>>; MAX_PARAMS],
    len: usize,
}

impl<'a> ParamList<'a> {
    fn push(&mut self, param: Param<'a>) -> Result<(), ErrorKind> {
        if self.len >= MAX_PARAMS {
            return Err(ErrorKind::Internal("route exceeds MAX_PARAMS captures".into()));
        }
        self.params[self.len] = Some(param);
        self.len += 1;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&'a [u8]> {
        self.params[..self.len]
            .iter()
            .flatten()
            .find(|p| p.name == name)
            .map(|p| p.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param<'a>> {
        self.params[..self.len].iter().flatten()
    }
}

/// A single path segment pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Capture(String),
}

/// An opaque handle identifying a registered route, returned by
/// [`Router::register`] and stashed in the trie's leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId(pub(crate) usize);

struct Node {
    static_children: HashMap<String, Node>,
    wildcard_child: Option<(String, Box<Node>)>,
    route: Option<RouteId>,
}

impl Node {
    fn new() -> Self {
        Self {
            static_children: HashMap::new(),
            wildcard_child: None,
            route: None,
        }
    }
}

pub struct RouteMeta {
    pub pattern: String,
    pub tags: Vec<String>,
}

/// Registers and matches `(method, path)` against route patterns. Immutable
/// after server start, per the concurrency model's "router is immutable
/// after server start" rule — registration all happens before `run()`.
pub struct Router {
    roots: HashMap<Method, Node>,
    patterns: HashMap<Method, Vec<String>>,
    metas: Vec<RouteMeta>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            roots: HashMap::new(),
            patterns: HashMap::new(),
            metas: Vec::new(),
        }
    }

    /// Registers `pattern` (e.g. `/users/{id}`) for `method`. Fails with
    /// [`RoutingError::RouteConflict`] if the same method already has an
    /// identical pattern registered.
    pub fn register(&mut self, method: Method, pattern: &str) -> Result<RouteId, ErrorKind> {
        self.register_tagged(method, pattern, Vec::new())
    }

    pub fn register_tagged(
        &mut self,
        method: Method,
        pattern: &str,
        tags: Vec<String>,
    ) -> Result<RouteId, ErrorKind> {
        let existing = self.patterns.entry(method).or_default();
        if existing.iter().any(|p| p == pattern) {
            return Err(RoutingError::RouteConflict(pattern.to_string()).into());
        }
        existing.push(pattern.to_string());

        let segments = parse_pattern(pattern)?;
        let captures = segments.iter().filter(|s| matches!(s, Segment::Capture(_))).count();
        if captures > MAX_PARAMS {
            return Err(ErrorKind::Internal(format!(
                "route {pattern:?} exceeds MAX_PARAMS={MAX_PARAMS} captures"
            )));
        }

        let route_id = RouteId(self.metas.len());
        self.metas.push(RouteMeta {
            pattern: pattern.to_string(),
            tags,
        });

        let root = self.roots.entry(method).or_insert_with(Node::new);
        let mut node = root;
        for segment in segments {
            node = match segment {
                Segment::Static(s) => node.static_children.entry(s).or_insert_with(Node::new),
                Segment::Capture(name) => {
                    if node.wildcard_child.is_none() {
                        node.wildcard_child = Some((name.clone(), Box::new(Node::new())));
                    }
                    &mut node.wildcard_child.as_mut().unwrap().1
                }
            };
        }
        node.route = Some(route_id);

        Ok(route_id)
    }

    /// Mounts `sub` under `prefix`, prepending it to every one of `sub`'s
    /// patterns and appending `tags` to each. `sub` is consumed; callers
    /// build it standalone first and mount it once routes are final.
    pub fn mount(&mut self, prefix: &str, sub: Router, tags: Vec<String>) -> Result<(), ErrorKind> {
        for (method, patterns) in sub.patterns {
            for pattern in patterns {
                let full = format!("{}{}", prefix.trim_end_matches('/'), pattern);
                self.register_tagged(method, &full, tags.clone())?;
            }
        }
        Ok(())
    }

    pub fn meta(&self, id: RouteId) -> &RouteMeta {
        &self.metas[id.0]
    }

    /// Matches `(method, path)`. Returns `RoutingError::NotFound` when no
    /// pattern of any method matches the path, and `MethodNotAllowed` when a
    /// pattern matches the path under a different method.
    pub fn matches<'a>(&'a self, method: Method, path: &'a [u8]) -> Result<(RouteId, ParamList<'a>), ErrorKind> {
        let segments: Vec<&'a [u8]> = path.split(|&b| b == b'/').filter(|s| !s.is_empty()).collect();

        if let Some(root) = self.roots.get(&method) {
            if let Some((id, params)) = match_node(root, &segments, 0, ParamList::default())? {
                return Ok((id, params));
            }
        }

        for (other_method, root) in &self.roots {
            if *other_method == method {
                continue;
            }
            if match_node(root, &segments, 0, ParamList::default())?.is_some() {
                return Err(RoutingError::MethodNotAllowed.into());
            }
        }

        Err(RoutingError::NotFound.into())
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn match_node<'a>(
    node: &'a Node,
    segments: &[&'a [u8]],
    depth: usize,
    mut params: ParamList<'a>,
) -> Result<Option<(RouteId, ParamList<'a>)>, ErrorKind> {
    if depth == segments.len() {
        return Ok(node.route.map(|id| (id, params)));
    }

    let segment = segments[depth];
    // static children win over the wildcard at this node, per precedence.
    if let Ok(segment_str) = std::str::from_utf8(segment) {
        if let Some(child) = node.static_children.get(segment_str) {
            if let Some(found) = match_node(child, segments, depth + 1, ParamList {
                params: params.params,
                len: params.len,
            })? {
                return Ok(Some(found));
            }
        }
    }

    if let Some((name, child)) = &node.wildcard_child {
        let mut next_params = ParamList {
            params: params.params,
            len: params.len,
        };
        next_params.push(Param {
            name: name.as_str(),
            value: segment,
        })?;
        if let Some(found) = match_node(child, segments, depth + 1, next_params)? {
            return Ok(Some(found));
        }
    }

    let _ = &mut params; // silence unused-mut when neither branch matched
    Ok(None)
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, ErrorKind> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|raw| {
            if let Some(name) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if name.is_empty() {
                    return Err(ErrorKind::Internal(format!("empty capture name in {pattern:?}")));
                }
                Ok(Segment::Capture(name.to_string()))
            } else {
                Ok(Segment::Static(raw.to_string()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::types::Method;

    #[test]
    fn static_beats_wildcard_at_same_depth() {
        let mut router = Router::new();
        let a = router.register(Method::Get, "/users/me").unwrap();
        let b = router.register(Method::Get, "/users/{id}").unwrap();

        let (matched, _) = router.matches(Method::Get, b"/users/me").unwrap();
        assert_eq!(matched, a);

        let (matched, params) = router.matches(Method::Get, b"/users/42").unwrap();
        assert_eq!(matched, b);
        assert_eq!(params.get("id"), Some(b"42".as_slice()));
    }

    #[test]
    fn duplicate_pattern_same_method_is_a_conflict() {
        let mut router = Router::new();
        router.register(Method::Get, "/a").unwrap();
        let err = router.register(Method::Get, "/a").unwrap_err();
        assert_eq!(err.code(), "ROUTE_CONFLICT");
    }

    #[test]
    fn same_pattern_different_method_is_fine() {
        let mut router = Router::new();
        router.register(Method::Get, "/a").unwrap();
        router.register(Method::Post, "/a").unwrap();
    }

    #[test]
    fn unmatched_path_is_not_found() {
        let mut router = Router::new();
        router.register(Method::Get, "/a").unwrap();
        let err = router.matches(Method::Get, b"/b").unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn matched_path_wrong_method_is_method_not_allowed() {
        let mut router = Router::new();
        router.register(Method::Post, "/a").unwrap();
        let err = router.matches(Method::Get, b"/a").unwrap_err();
        assert_eq!(err.code(), "METHOD_NOT_ALLOWED");
    }

    #[test]
    fn mounting_prefixes_sub_router_patterns() {
        let mut sub = Router::new();
        sub.register(Method::Get, "/health").unwrap();

        let mut router = Router::new();
        router.mount("/api", sub, vec!["internal".to_string()]).unwrap();

        let (id, _) = router.matches(Method::Get, b"/api/health").unwrap();
        assert_eq!(router.meta(id).pattern, "/api/health");
        assert_eq!(router.meta(id).tags, vec!["internal".to_string()]);
    }

    #[test]
    fn too_many_captures_is_rejected() {
        let mut router = Router::new();
        let pattern = (0..MAX_PARAMS + 1)
            .map(|i| format!("{{p{i}}}"))
            .collect::<Vec<_>>()
            .join("/");
        let err = router.register(Method::Get, &format!("/{pattern}")).unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
