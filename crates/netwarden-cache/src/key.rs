use sha2::{Digest, Sha256};

use crate::upstream::Method;

/// Number of leading path segments that name a resource, e.g.
/// `/api/v0/devices` for `/api/v0/devices/12/ports`.
const RESOURCE_DEPTH: usize = 3;

/// Digest identifying one cached upstream read.
///
/// Built from the method, the path and the query parameters sorted by name,
/// so `?b=2&a=1` and `?a=1&b=2` share an entry. Repeated names keep their
/// relative order, so `?id=1&id=2` and `?id=2&id=1` do not. Each component is length
/// framed before hashing; no two distinct calls share a key by concatenation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
    endpoint: String,
}

impl CacheKey {
    pub fn for_call(method: Method, endpoint: &str) -> Self {
        let (path, query) = split_query(endpoint);
        let mut params: Vec<&str> = query
            .map(|q| q.split('&').filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        params.sort_by_key(|&param| param_name(param));

        let mut hasher = Sha256::new();
        frame(&mut hasher, method.as_str());
        frame(&mut hasher, path);
        for param in params {
            frame(&mut hasher, param);
        }

        Self {
            digest: hex::encode(hasher.finalize()),
            endpoint: path.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.digest
    }

    /// Path component of the call, without the query string.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn frame(hasher: &mut Sha256, part: &str) {
    hasher.update((part.len() as u64).to_be_bytes());
    hasher.update(part.as_bytes());
}

fn param_name(param: &str) -> &str {
    param.split_once('=').map_or(param, |(name, _)| name)
}

fn split_query(endpoint: &str) -> (&str, Option<&str>) {
    match endpoint.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (endpoint, None),
    }
}

/// Root of the resource an endpoint addresses. A write anywhere below it
/// invalidates every cached read below it.
pub fn resource_root(endpoint: &str) -> &str {
    let (path, _) = split_query(endpoint);
    let mut seen = 0;
    for (idx, ch) in path.char_indices().skip(1) {
        if ch == '/' {
            seen += 1;
            if seen == RESOURCE_DEPTH {
                return &path[..idx];
            }
        }
    }
    path
}
