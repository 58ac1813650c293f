//! Label derivation for request metrics.
//!
//! The `path` label must stay low-cardinality. The matched route template
//! (`/users/:id`) is used whenever the router produced one; requests that did
//! not match a route fall back to [`normalize_path`].

use axum::extract::{MatchedPath, Request};
use std::collections::HashSet;

/// Method and path labels captured when a request enters the interceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLabels {
    pub method: String,
    pub path: String,
}

impl RequestLabels {
    /// Derive labels from an incoming request
    pub fn from_request(req: &Request) -> Self {
        let path = req
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string())
            .unwrap_or_else(|| normalize_path(req.uri().path()));

        Self {
            method: req.method().as_str().to_string(),
            path,
        }
    }
}

/// Normalize a raw path for metrics (replace IDs with placeholders)
pub fn normalize_path(path: &str) -> String {
    // Numeric and UUID segments become placeholders so per-ID series are
    // folded into one.
    path.split('/')
        .map(|part| {
            if part.is_empty() {
                part
            } else if part.parse::<u64>().is_ok() {
                ":id"
            } else if part.parse::<uuid::Uuid>().is_ok() {
                ":uuid"
            } else {
                part
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Paths excluded from recording
///
/// Entries ending in `*` match every path starting with the text before the
/// star. All other entries must match the path exactly.
#[derive(Debug, Clone, Default)]
pub struct SkipList {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl SkipList {
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut list = Self::default();
        for entry in entries {
            list.insert(entry.as_ref());
        }
        list
    }

    pub fn insert(&mut self, entry: &str) {
        match entry.strip_suffix('*') {
            Some(prefix) => self.prefixes.push(prefix.to_string()),
            None => {
                self.exact.insert(entry.to_string());
            }
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.exact.contains(path) || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_path_normalization() {
        assert_eq!(normalize_path("/api/users/123"), "/api/users/:id");
        assert_eq!(normalize_path("/api/users"), "/api/users");
        assert_eq!(
            normalize_path("/api/users/550e8400-e29b-41d4-a716-446655440000"),
            "/api/users/:uuid"
        );
        assert_eq!(normalize_path("/orders/42/items/7"), "/orders/:id/items/:id");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/v2/"), "/v2/");
    }

    #[test]
    fn test_labels_fall_back_to_normalized_path() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/users/123?verbose=true")
            .body(Body::empty())
            .unwrap();

        let labels = RequestLabels::from_request(&req);
        assert_eq!(labels.method, "POST");
        assert_eq!(labels.path, "/api/users/:id");
    }

    #[test]
    fn test_skip_list_exact_and_prefix() {
        let skip = SkipList::new(["/metrics", "/internal/*"]);

        assert!(skip.matches("/metrics"));
        assert!(!skip.matches("/metrics/extra"));
        assert!(skip.matches("/internal/"));
        assert!(skip.matches("/internal/debug/vars"));
        assert!(!skip.matches("/internals"));
        assert!(!skip.matches("/api"));
    }

    #[test]
    fn test_empty_skip_list() {
        let skip = SkipList::default();
        assert!(skip.is_empty());
        assert!(!skip.matches("/metrics"));
    }
}
