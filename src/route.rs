//! Route resolution for introspection
//!
//! Introspection records carry the route a message's URI belongs to
//! (e.g. `foo.retrieve` for `/api/v1/foo/123`). Resolution is best effort:
//! no match simply leaves the route absent.

use url::Url;

/// Resolves an origin URI and method to a route descriptor
pub trait RouteResolver: Send + Sync {
    fn resolve_route(&self, uri: &str, method: &str) -> Option<String>;
}

impl<F> RouteResolver for F
where
    F: Fn(&str, &str) -> Option<String> + Send + Sync,
{
    fn resolve_route(&self, uri: &str, method: &str) -> Option<String> {
        self(uri, method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

#[derive(Debug, Clone)]
struct Rule {
    method: String,
    segments: Vec<Segment>,
    endpoint: String,
}

impl Rule {
    fn matches(&self, method: &str, segments: &[&str]) -> bool {
        self.method.eq_ignore_ascii_case(method)
            && self.segments.len() == segments.len()
            && self.segments.iter().zip(segments).all(|(rule, actual)| match rule {
                Segment::Literal(literal) => literal == actual,
                Segment::Param => !actual.is_empty(),
            })
    }
}

/// Table of `(method, path pattern, endpoint)` rules
///
/// Patterns are `/`-separated; segments written as `{name}` match any
/// non-empty segment. Rules are tried in registration order.
///
/// ```rust
/// use microcosm_producer::route::{RouteResolver, RouteTable};
///
/// let routes = RouteTable::new().route("GET", "/api/v1/foo/{foo_id}", "foo.retrieve");
/// assert_eq!(
///     routes.resolve_route("http://localhost/api/v1/foo/42?x=1", "GET").as_deref(),
///     Some("foo.retrieve"),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<Rule>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule
    pub fn route(mut self, method: &str, pattern: &str, endpoint: impl Into<String>) -> Self {
        let segments = split_path(pattern)
            .into_iter()
            .map(|segment| {
                if segment.starts_with('{') && segment.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();

        self.rules.push(Rule {
            method: method.to_string(),
            segments,
            endpoint: endpoint.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RouteResolver for RouteTable {
    fn resolve_route(&self, uri: &str, method: &str) -> Option<String> {
        let path = uri_path(uri)?;
        let segments = split_path(&path);
        self.rules
            .iter()
            .find(|rule| rule.matches(method, &segments))
            .map(|rule| rule.endpoint.clone())
    }
}

/// Base for URIs given as bare paths (e.g. `/api/v1/foo/1`)
const RELATIVE_BASE: &str = "http://localhost/";

/// Path component of a URI, or `None` when it is blank or unparseable
fn uri_path(uri: &str) -> Option<String> {
    if uri.trim().is_empty() {
        return None;
    }
    let base = Url::parse(RELATIVE_BASE).ok()?;
    Url::options()
        .base_url(Some(&base))
        .parse(uri)
        .ok()
        .map(|url| url.path().to_string())
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
