//! Resource catalog and role grants.
//!
//! The registry is built once at startup and read-only afterwards. Evaluation is
//! an exact `(resource, action)` lookup in the role's grant set: no wildcards, no
//! resource hierarchy, and an unknown role grants nothing.

use crate::models::{Permission, User};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Registry construction failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Grant string was not `resource:action`.
    #[error("malformed grant {grant:?} for role {role}")]
    Malformed {
        /// Role being configured.
        role: String,
        /// Offending grant.
        grant: String,
    },

    /// Grant names a resource outside the catalog.
    #[error("role {role} grants unknown resource {resource}")]
    UnknownResource {
        /// Role being configured.
        role: String,
        /// Unknown resource.
        resource: String,
    },

    /// Grant names an action the resource does not support.
    #[error("role {role} grants unsupported action {resource}:{action}")]
    UnknownAction {
        /// Role being configured.
        role: String,
        /// Catalogued resource.
        resource: String,
        /// Unsupported action.
        action: String,
    },
}

/// A catalogued resource and the actions it supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    /// Display name.
    pub name: String,
    /// What the resource holds.
    pub description: String,
    /// Supported actions, in catalog order.
    pub actions: Vec<String>,
}

const READ: &str = "read";
const WRITE: &str = "write";
const DELETE: &str = "delete";
const PUBLISH: &str = "publish";

/// `(key, display name, description, actions)`
const CATALOG: &[(&str, &str, &str, &[&str])] = &[
    ("pages", "Pages", "Site pages and their sections", &[READ, WRITE, DELETE, PUBLISH]),
    ("portfolio", "Portfolio", "Case studies and project showcases", &[READ, WRITE, DELETE, PUBLISH]),
    ("services", "Services", "Service offerings listed on the site", &[READ, WRITE, DELETE, PUBLISH]),
    ("blog", "Blog", "Blog posts and categories", &[READ, WRITE, DELETE, PUBLISH]),
    ("testimonials", "Testimonials", "Client testimonials", &[READ, WRITE, DELETE, PUBLISH]),
    ("media", "Media", "Uploaded images and files", &[READ, WRITE, DELETE]),
    ("messages", "Messages", "Contact form submissions", &[READ, DELETE]),
    ("users", "Users", "Administrator accounts", &[READ, WRITE, DELETE]),
    ("settings", "Settings", "Site-wide configuration", &[READ, WRITE]),
    ("analytics", "Analytics", "Traffic and engagement reports", &[READ]),
];

const CONTENT: &[&str] = &["pages", "portfolio", "services", "blog", "testimonials"];

/// Resource catalog plus role → grant map.
#[derive(Debug, Clone)]
pub struct PermissionRegistry {
    resources: BTreeMap<String, ResourceDescriptor>,
    roles: HashMap<String, BTreeSet<Permission>>,
}

impl PermissionRegistry {
    /// Catalog and roles for the site administration panel.
    ///
    /// Roles: `super_admin` (everything), `admin` (everything but account
    /// management writes), `editor` (content authoring), `viewer` (read-only
    /// outside accounts and settings).
    #[must_use]
    pub fn builtin() -> Self {
        let resources: BTreeMap<String, ResourceDescriptor> = CATALOG
            .iter()
            .map(|(key, name, description, actions)| {
                (
                    (*key).to_string(),
                    ResourceDescriptor {
                        name: (*name).to_string(),
                        description: (*description).to_string(),
                        actions: actions.iter().map(|a| (*a).to_string()).collect(),
                    },
                )
            })
            .collect();

        let mut registry = Self {
            resources,
            roles: HashMap::new(),
        };
        registry.grant("super_admin", &catalog_where(|_, _| true));
        registry.grant("admin", &catalog_where(|r, a| r != "users" || a == READ));
        registry.grant(
            "editor",
            &catalog_where(|r, a| {
                (CONTENT.contains(&r) && a != DELETE)
                    || (r == "media" && a != DELETE)
                    || (r == "messages" && a == READ)
                    || (r == "analytics" && a == READ)
            }),
        );
        registry.grant(
            "viewer",
            &catalog_where(|r, a| a == READ && r != "users" && r != "settings"),
        );
        registry
    }

    /// Built-in registry with role grants replaced by `overrides`.
    ///
    /// Each override maps a role to `"resource:action"` strings and replaces that
    /// role's grants entirely. Roles not mentioned keep their built-in grants.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when a grant is malformed or outside the catalog.
    pub fn from_config(overrides: &BTreeMap<String, Vec<String>>) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin();
        for (role, grants) in overrides {
            let mut parsed = Vec::with_capacity(grants.len());
            for grant in grants {
                let (resource, action) =
                    grant
                        .split_once(':')
                        .ok_or_else(|| RegistryError::Malformed {
                            role: role.clone(),
                            grant: grant.clone(),
                        })?;
                registry.check(role, resource.trim(), action.trim())?;
                parsed.push((resource.trim(), action.trim()));
            }
            registry.roles.remove(role);
            registry.grant(role, &parsed);
            tracing::info!(role = %role, grants = parsed.len(), "role grants overridden");
        }
        Ok(registry)
    }

    fn check(&self, role: &str, resource: &str, action: &str) -> Result<(), RegistryError> {
        let descriptor =
            self.resources
                .get(resource)
                .ok_or_else(|| RegistryError::UnknownResource {
                    role: role.to_string(),
                    resource: resource.to_string(),
                })?;
        if !descriptor.actions.iter().any(|a| a == action) {
            return Err(RegistryError::UnknownAction {
                role: role.to_string(),
                resource: resource.to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn grant(&mut self, role: &str, grants: &[(&str, &str)]) {
        let set = self.roles.entry(role.to_string()).or_default();
        for (resource, action) in grants {
            let label = self
                .resources
                .get(*resource)
                .map_or(*resource, |d| d.name.as_str());
            set.insert(Permission {
                resource: (*resource).to_string(),
                action: (*action).to_string(),
                description: describe(action, label),
            });
        }
    }

    /// Every grant of the user's role, ordered by resource then action.
    #[must_use]
    pub fn get_user_permissions(&self, user: &User) -> Vec<Permission> {
        self.role_permissions(&user.role)
    }

    /// Grants of a role by name. Unknown roles have none.
    #[must_use]
    pub fn role_permissions(&self, role: &str) -> Vec<Permission> {
        self.roles
            .get(role)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The full resource catalog.
    #[must_use]
    pub const fn get_available_resources(&self) -> &BTreeMap<String, ResourceDescriptor> {
        &self.resources
    }

    /// Names of every configured role.
    #[must_use]
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    /// True iff the user's role holds exactly `(resource, action)`.
    #[must_use]
    pub fn evaluate(&self, user: &User, resource: &str, action: &str) -> bool {
        self.role_allows(&user.role, resource, action)
    }

    /// Role-level form of [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn role_allows(&self, role: &str, resource: &str, action: &str) -> bool {
        self.roles
            .get(role)
            .is_some_and(|set| set.iter().any(|p| p.matches(resource, action)))
    }
}

/// Catalogued `(resource, action)` pairs accepted by `keep`.
fn catalog_where(keep: impl Fn(&str, &str) -> bool) -> Vec<(&'static str, &'static str)> {
    CATALOG
        .iter()
        .flat_map(|&(resource, _, _, actions)| actions.iter().map(move |&action| (resource, action)))
        .filter(|&(resource, action)| keep(resource, action))
        .collect()
}

fn describe(action: &str, label: &str) -> String {
    match action {
        READ => format!("View {label}"),
        WRITE => format!("Create and edit {label}"),
        DELETE => format!("Delete {label}"),
        PUBLISH => format!("Publish {label}"),
        other => format!("{other} {label}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn user(role: &str) -> User {
        User::new("a@x.com", "A", role, Utc::now())
    }

    #[test]
    fn builtin_roles_have_expected_reach() {
        let registry = PermissionRegistry::builtin();

        assert!(registry.evaluate(&user("super_admin"), "users", "delete"));
        assert!(registry.evaluate(&user("admin"), "settings", "write"));
        assert!(!registry.evaluate(&user("admin"), "users", "write"));
        assert!(registry.evaluate(&user("editor"), "blog", "publish"));
        assert!(!registry.evaluate(&user("editor"), "blog", "delete"));
        assert!(registry.evaluate(&user("viewer"), "pages", "read"));
        assert!(!registry.evaluate(&user("viewer"), "settings", "read"));
        assert!(!registry.evaluate(&user("intern"), "pages", "read"));
    }

    #[test]
    fn permissions_are_sorted_and_described() {
        let registry = PermissionRegistry::builtin();
        let perms = registry.get_user_permissions(&user("viewer"));

        assert!(!perms.is_empty());
        assert!(perms.windows(2).all(|w| w[0] <= w[1]));
        assert!(perms.iter().all(|p| p.action == "read"));
        let analytics = perms.iter().find(|p| p.resource == "analytics").unwrap();
        assert_eq!(analytics.description, "View Analytics");
    }

    #[test]
    fn catalog_lists_every_resource() {
        let registry = PermissionRegistry::builtin();
        let resources = registry.get_available_resources();

        assert_eq!(resources.len(), CATALOG.len());
        assert_eq!(resources["messages"].actions, vec!["read", "delete"]);
        assert_eq!(resources["pages"].name, "Pages");
    }

    #[test]
    fn overrides_replace_role_grants() {
        let overrides = BTreeMap::from([
            ("editor".to_string(), vec!["pages:read".to_string(), " blog : write ".to_string()]),
            ("auditor".to_string(), vec!["analytics:read".to_string()]),
        ]);
        let registry = PermissionRegistry::from_config(&overrides).unwrap();

        assert!(registry.role_allows("editor", "blog", "write"));
        assert!(!registry.role_allows("editor", "blog", "publish"));
        assert!(registry.role_allows("auditor", "analytics", "read"));
        assert!(registry.role_allows("admin", "pages", "delete"));
        assert_eq!(registry.roles(), vec!["admin", "auditor", "editor", "super_admin", "viewer"]);
    }

    #[test]
    fn overrides_are_validated() {
        let bad = |grant: &str| {
            PermissionRegistry::from_config(&BTreeMap::from([(
                "editor".to_string(),
                vec![grant.to_string()],
            )]))
            .unwrap_err()
        };

        assert!(matches!(bad("pages"), RegistryError::Malformed { .. }));
        assert!(matches!(bad("widgets:read"), RegistryError::UnknownResource { .. }));
        assert!(matches!(bad("analytics:write"), RegistryError::UnknownAction { .. }));
    }

    fn catalog_pair() -> impl Strategy<Value = (String, String)> {
        let pairs: Vec<(String, String)> = CATALOG
            .iter()
            .flat_map(|(r, _, _, actions)| actions.iter().map(move |a| ((*r).to_string(), (*a).to_string())))
            .collect();
        prop::sample::select(pairs)
    }

    proptest! {
        #[test]
        fn evaluate_matches_grant_set(
            role in prop::sample::select(vec!["super_admin", "admin", "editor", "viewer"]),
            (resource, action) in catalog_pair(),
        ) {
            let registry = PermissionRegistry::builtin();
            let granted = registry
                .role_permissions(role)
                .iter()
                .any(|p| p.resource == resource && p.action == action);
            prop_assert_eq!(registry.evaluate(&user(role), &resource, &action), granted);
        }

        #[test]
        fn no_wildcards_or_prefixes(
            role in prop::sample::select(vec!["super_admin", "admin", "editor", "viewer"]),
            (resource, action) in catalog_pair(),
            suffix in "[*:/a-z]{1,4}",
        ) {
            let registry = PermissionRegistry::builtin();
            let u = user(role);
            prop_assert!(!registry.evaluate(&u, "*", &action));
            prop_assert!(!registry.evaluate(&u, &resource, "*"));
            let suffixed_resource = format!("{resource}{suffix}");
            let suffixed_action = format!("{action}{suffix}");
            prop_assert!(!registry.evaluate(&u, &suffixed_resource, &action));
            prop_assert!(!registry.evaluate(&u, &resource, &suffixed_action));
        }
    }
}
