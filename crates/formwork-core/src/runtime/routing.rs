// formwork-core/src/runtime/routing.rs
// ============================================================================
// Module: Formwork Routing
// Description: Regex route table mapping request routes to controllers.
// Purpose: Resolve a request route into a controller, view, and parameters.
// Dependencies: regex, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Routes are regular expressions matched against the request route with
//! surrounding slashes trimmed. The first matching route wins. Registering a
//! pattern that already exists replaces the earlier target in place, so
//! widgets can override built-in routes without changing their priority.
//! String parameters of the exact form `$N` are replaced by capture group `N`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Built-in API and dashboard routes.
pub const BUILTIN_ROUTES: &[(&str, &str)] = &[
    ("^api/form/describe/?$", "Api/Form/Describe"),
    ("^api/table/describe/?$", "Api/Table/Describe"),
    ("^api/record/get/?$", "Api/Record/Get"),
    ("^api/record/get-list/?$", "Api/Record/GetList"),
    ("^api/record/lookup/?$", "Api/Record/Lookup"),
    ("^api/record/save/?$", "Api/Record/Save"),
    ("^api/record/delete/?$", "Api/Record/Delete"),
    ("^api/config/set/?$", "Api/Config/Set"),
    ("^dashboard/?$", "Dashboard"),
];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Routing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Route pattern is not a valid regular expression.
    #[error("invalid route pattern {pattern}: {message}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
        /// Regex error.
        message: String,
    },
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Route declaration as written in widget manifests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
    /// Regular expression matched against the route.
    pub pattern: String,
    /// Controller name.
    pub controller: String,
    /// View override.
    #[serde(default)]
    pub view: Option<String>,
    /// Permission override.
    #[serde(default)]
    pub permission: Option<String>,
    /// Static and captured parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Resolved route target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteTarget {
    /// Controller name; empty selects the default controller.
    pub controller: String,
    /// View override.
    pub view: Option<String>,
    /// Permission override.
    pub permission: Option<String>,
    /// Route parameters.
    pub params: Map<String, Value>,
}

impl From<RouteSpec> for RouteTarget {
    fn from(spec: RouteSpec) -> Self {
        Self {
            controller: spec.controller,
            view: spec.view,
            permission: spec.permission,
            params: spec.params,
        }
    }
}

/// Compiled route.
#[derive(Debug, Clone)]
struct Route {
    /// Pattern source.
    pattern: String,
    /// Compiled pattern.
    regex: Regex,
    /// Target.
    target: RouteTarget,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Ordered route table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    /// Routes in priority order.
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router holding the built-in routes.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] if a built-in pattern fails to compile.
    pub fn with_builtin_routes() -> Result<Self, RoutingError> {
        let mut router = Self::new();
        for (pattern, controller) in BUILTIN_ROUTES {
            router.add(pattern, RouteTarget {
                controller: (*controller).to_string(),
                ..RouteTarget::default()
            })?;
        }
        Ok(router)
    }

    /// Adds a route or replaces the target of an existing pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::InvalidPattern`] when the pattern does not compile.
    pub fn add(&mut self, pattern: &str, target: RouteTarget) -> Result<(), RoutingError> {
        if let Some(existing) = self.routes.iter_mut().find(|route| route.pattern == pattern) {
            existing.target = target;
            return Ok(());
        }
        let regex = Regex::new(pattern).map_err(|err| RoutingError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        self.routes.push(Route {
            pattern: pattern.to_string(),
            regex,
            target,
        });
        Ok(())
    }

    /// Adds a route declared in a widget manifest.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::InvalidPattern`] when the pattern does not compile.
    pub fn add_spec(&mut self, spec: RouteSpec) -> Result<(), RoutingError> {
        let pattern = spec.pattern.clone();
        self.add(&pattern, RouteTarget::from(spec))
    }

    /// Resolves a route; no match yields an empty target.
    #[must_use]
    pub fn resolve(&self, route: &str) -> RouteTarget {
        let route = route.trim_matches('/');
        for candidate in &self.routes {
            if let Some(captures) = candidate.regex.captures(route) {
                let mut target = candidate.target.clone();
                for value in target.params.values_mut() {
                    if let Some(group) = capture_reference(value)
                        && let Some(found) = captures.get(group)
                    {
                        *value = Value::String(found.as_str().to_string());
                    }
                }
                return target;
            }
        }
        RouteTarget::default()
    }

    /// Returns the route patterns in priority order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|route| route.pattern.as_str())
    }
}

/// Parses a `$N` capture reference.
fn capture_reference(value: &Value) -> Option<usize> {
    value.as_str()?.strip_prefix('$')?.parse().ok()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::*;

    #[test]
    fn builtin_routes_resolve_with_trimmed_slashes() {
        let router = Router::with_builtin_routes().unwrap();
        assert_eq!(router.resolve("/api/record/save/").controller, "Api/Record/Save");
        assert_eq!(router.resolve("api/record/get-list").controller, "Api/Record/GetList");
        assert_eq!(router.resolve("dashboard").controller, "Dashboard");
        assert_eq!(router.resolve("nowhere"), RouteTarget::default());
    }

    #[test]
    fn capture_groups_fill_params() {
        let mut router = Router::new();
        router
            .add_spec(RouteSpec {
                pattern: "^customers/(\\d+)/?$".to_string(),
                controller: "Crm/Customer".to_string(),
                params: json!({"id": "$1", "mode": "edit"}).as_object().cloned().unwrap(),
                ..RouteSpec::default()
            })
            .unwrap();
        let target = router.resolve("customers/12");
        assert_eq!(target.params["id"], json!("12"));
        assert_eq!(target.params["mode"], json!("edit"));
    }

    #[test]
    fn same_pattern_replaces_in_place() {
        let mut router = Router::with_builtin_routes().unwrap();
        let before: Vec<String> = router.patterns().map(str::to_string).collect();
        router
            .add("^dashboard/?$", RouteTarget {
                controller: "Custom/Dashboard".to_string(),
                ..RouteTarget::default()
            })
            .unwrap();
        let after: Vec<String> = router.patterns().map(str::to_string).collect();
        assert_eq!(before, after);
        assert_eq!(router.resolve("dashboard").controller, "Custom/Dashboard");
    }

    #[test]
    fn first_match_wins() {
        let mut router = Router::new();
        router.add("^a", RouteTarget { controller: "First".to_string(), ..RouteTarget::default() }).unwrap();
        router.add("^ab", RouteTarget { controller: "Second".to_string(), ..RouteTarget::default() }).unwrap();
        assert_eq!(router.resolve("abc").controller, "First");
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let mut router = Router::new();
        assert!(matches!(
            router.add("(", RouteTarget::default()),
            Err(RoutingError::InvalidPattern { .. })
        ));
    }
}
