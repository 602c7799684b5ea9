//! Route patterns, descriptors and the route table.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use super::error::RouteError;
use crate::auth::Role;

/// Captured `:name` placeholders
pub type RouteParams = BTreeMap<String, String>;

/// Canonical form of a navigation path.
///
/// Repeated slashes are collapsed, a trailing slash is removed (except for the
/// root), the query string is kept and any fragment is dropped.
pub fn normalize_path(path: &str) -> String {
    let without_fragment = path.split('#').next().unwrap_or_default();
    let (raw_path, query) = match without_fragment.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (without_fragment, None),
    };

    let segments: Vec<&str> = raw_path.split('/').filter(|s| !s.is_empty()).collect();
    let mut normalized = format!("/{}", segments.join("/"));

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        normalized.push('?');
        normalized.push_str(query);
    }
    normalized
}

/// Split a normalized path into (path, query)
pub fn split_query(path: &str) -> (&str, Option<&str>) {
    match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

/// A parsed route pattern such as `/budgets/:id/edit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }
        if pattern.contains(['?', '#']) {
            return Err(invalid("must not contain a query or fragment"));
        }

        let raw = normalize_path(pattern);
        let mut parsed = Vec::new();
        for segment in segments(&raw) {
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(invalid("placeholder names must be non-empty [A-Za-z0-9_]"));
                }
                if parsed.iter().any(|s| matches!(s, Segment::Param(n) if n == name)) {
                    return Err(invalid("duplicate placeholder name"));
                }
                parsed.push(Segment::Param(name.to_string()));
            } else if segment.contains(':') {
                return Err(invalid("':' is only allowed at the start of a segment"));
            } else {
                parsed.push(Segment::Static(segment.to_string()));
            }
        }

        Ok(Self {
            raw,
            segments: parsed,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn has_params(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Param(_)))
    }

    /// Match a path (no query). Segment counts must be equal.
    pub fn matches(&self, path: &str) -> Option<RouteParams> {
        let parts: Vec<&str> = segments(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = RouteParams::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Static(expected) if expected == part => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }

    /// Compare two patterns that both matched the same path.
    /// Static segments beat placeholders, left to right.
    pub fn cmp_specificity(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            match (a, b) {
                (Segment::Static(_), Segment::Param(_)) => return Ordering::Greater,
                (Segment::Param(_), Segment::Static(_)) => return Ordering::Less,
                _ => {}
            }
        }
        Ordering::Equal
    }

    /// Pattern with placeholder names erased. Two patterns with the same
    /// shape match exactly the same paths.
    pub fn shape(&self) -> String {
        let parts: Vec<&str> = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Static(name) => name.as_str(),
                Segment::Param(_) => ":",
            })
            .collect();
        format!("/{}", parts.join("/"))
    }
}

/// A registered screen
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pub name: String,
    pub pattern: RoutePattern,
    /// Empty means any visitor, signed in or not
    pub allowed_roles: Vec<Role>,
    pub cacheable: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Menu label; `None` keeps the route out of the menu
    pub menu_label: Option<String>,
    /// Name of the parent route, for breadcrumbs
    pub parent: Option<String>,
    pub redirect: Option<String>,
}

impl RouteDescriptor {
    pub fn new(name: &str, pattern: &str) -> Result<Self, RouteError> {
        Ok(Self {
            name: name.to_string(),
            pattern: RoutePattern::parse(pattern)?,
            allowed_roles: Vec::new(),
            cacheable: true,
            title: None,
            description: None,
            menu_label: None,
            parent: None,
            redirect: None,
        })
    }

    pub fn roles(mut self, roles: &[Role]) -> Self {
        self.allowed_roles = roles.to_vec();
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn menu(mut self, label: &str) -> Self {
        self.menu_label = Some(label.to_string());
        self
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn redirect_to(mut self, target: &str) -> Self {
        self.redirect = Some(normalize_path(target));
        self
    }

    pub fn allows(&self, role: Option<Role>) -> bool {
        if self.allowed_roles.is_empty() {
            return true;
        }
        role.is_some_and(|r| self.allowed_roles.contains(&r))
    }

    /// Display title: explicit title, else the route name
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub route: &'a RouteDescriptor,
    pub params: RouteParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Fails if another route has the same shape.
    pub fn register(&mut self, route: RouteDescriptor) -> Result<(), RouteError> {
        let shape = route.pattern.shape();
        if let Some(existing) = self.routes.iter().find(|r| r.pattern.shape() == shape) {
            return Err(RouteError::Ambiguous {
                pattern: route.pattern.as_str().to_string(),
                existing: existing.pattern.as_str().to_string(),
            });
        }
        self.routes.push(route);
        Ok(())
    }

    /// Most specific route matching `path`. Any query string is ignored.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let (path, _) = split_query(path);
        self.routes
            .iter()
            .filter_map(|route| route.pattern.matches(path).map(|params| RouteMatch { route, params }))
            .max_by(|a, b| a.route.pattern.cmp_specificity(&b.route.pattern))
    }

    pub fn get(&self, name: &str) -> Option<&RouteDescriptor> {
        self.routes.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Menu entries visible to `role`, in registration order
    pub fn menu_items(&self, role: Option<Role>) -> Vec<MenuItem> {
        self.routes
            .iter()
            .filter(|r| r.allows(role) && !r.pattern.has_params())
            .filter_map(|r| {
                r.menu_label.as_ref().map(|label| MenuItem {
                    label: label.clone(),
                    url: r.pattern.as_str().to_string(),
                })
            })
            .collect()
    }

    /// Trail from the home route down to the route matching `path`
    pub fn breadcrumbs(&self, path: &str, home: &str) -> Vec<Breadcrumb> {
        let mut trail = Vec::new();
        let Some(matched) = self.resolve(&normalize_path(path)) else {
            return trail;
        };

        let mut chain = vec![Breadcrumb {
            name: matched.route.display_title().to_string(),
            url: split_query(&normalize_path(path)).0.to_string(),
        }];
        let mut parent = matched.route.parent.as_deref();
        // Parent chains are short; the bound guards against cycles
        for _ in 0..self.routes.len() {
            let Some(route) = parent.and_then(|name| self.get(name)) else {
                break;
            };
            chain.push(Breadcrumb {
                name: route.display_title().to_string(),
                url: route.pattern.as_str().to_string(),
            });
            parent = route.parent.as_deref();
        }

        if let Some(home_route) = self.get(home) {
            if chain.iter().all(|c| c.url != home_route.pattern.as_str()) {
                trail.push(Breadcrumb {
                    name: "Home".to_string(),
                    url: home_route.pattern.as_str().to_string(),
                });
            }
        }
        trail.extend(chain.into_iter().rev());
        trail
    }
}
