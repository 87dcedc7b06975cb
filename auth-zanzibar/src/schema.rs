//! Namespace model: the static description of principal types, roles and
//! permission inheritance consumed by the schema compiler.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const USER_PRINCIPAL: &str = "user";
pub const GROUP_PRINCIPAL: &str = "group";

pub const ORGANIZATION_NAMESPACE: &str = "organization";
pub const PROJECT_NAMESPACE: &str = "project";
pub const GROUP_NAMESPACE: &str = "group";

/// Relation linking a group or project to its parent organization.
pub const ORGANIZATION_RELATION_NAME: &str = "organization";
pub const PROJECT_RELATION_NAME: &str = "project";

/// Permission on `group` that group subjects are linked through.
pub const MEMBERSHIP_PERMISSION: &str = "membership";

/// Principal types every schema accepts in addition to the compiled namespaces.
pub const BUILTIN_PRINCIPALS: [&str; 2] = [USER_PRINCIPAL, GROUP_PRINCIPAL];

/// Separator between a namespace and a role in role IDs and role references.
pub const ROLE_SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceType {
    #[default]
    System,
    ResourceGroup,
}

/// A relation from this namespace to another one whose roles and
/// permissions may be referenced as `<namespace_id>:<role>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InheritedNamespace {
    pub name: String,
    pub namespace_id: String,
}

impl InheritedNamespace {
    pub fn new(name: &str, namespace_id: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace_id: namespace_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    #[serde(default)]
    pub inherited_namespaces: Vec<InheritedNamespace>,
    #[serde(default, rename = "type")]
    pub namespace_type: NamespaceType,
    /// Role name to the principal types allowed to hold it.
    #[serde(default)]
    pub roles: HashMap<String, Vec<String>>,
    /// Permission name to the role references granting it.
    #[serde(default)]
    pub permissions: HashMap<String, Vec<String>>,
}

impl NamespaceConfig {
    pub fn new(namespace_type: NamespaceType) -> Self {
        Self {
            namespace_type,
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: &str, principals: &[&str]) -> Self {
        self.roles.insert(
            role.to_string(),
            principals.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn with_permission(mut self, permission: &str, roles: &[&str]) -> Self {
        self.permissions.insert(
            permission.to_string(),
            roles.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    pub fn inherits(mut self, name: &str, namespace_id: &str) -> Self {
        self.inherited_namespaces
            .push(InheritedNamespace::new(name, namespace_id));
        self
    }
}

pub type NamespaceConfigMap = HashMap<String, NamespaceConfig>;

/// A role reference inside a permission definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleReference<'a> {
    /// A role of the namespace being compiled.
    Local(&'a str),
    /// A role or permission held on a related namespace.
    Inherited { namespace: &'a str, role: &'a str },
}

impl<'a> RoleReference<'a> {
    pub fn parse(reference: &'a str) -> Self {
        match reference.rsplit_once(ROLE_SEPARATOR) {
            Some((namespace, role)) => RoleReference::Inherited { namespace, role },
            None => RoleReference::Local(reference),
        }
    }
}

/// Backend relation name for a possibly namespaced role ID (`group:member` -> `member`).
pub fn role_name(role_id: &str) -> &str {
    match role_id.rsplit_once(ROLE_SEPARATOR) {
        Some((_, name)) => name,
        None => role_id,
    }
}

pub fn role_id(namespace_id: &str, role: &str) -> String {
    format!("{}{}{}", namespace_id, ROLE_SEPARATOR, role)
}

pub fn append_if_unique<T: PartialEq + Clone>(base: &[T], extra: &[T]) -> Vec<T> {
    let mut result = base.to_vec();
    for item in extra {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    result
}

/// Merge `large` into `small`. Roles and permissions are unioned, the
/// namespace type is taken from `large`.
pub fn merge_namespace_config_maps(
    small: &NamespaceConfigMap,
    large: &NamespaceConfigMap,
) -> NamespaceConfigMap {
    let mut combined = small.clone();

    for (namespace_name, namespace_config) in large {
        let entry = combined.entry(namespace_name.clone()).or_default();

        for (role_name, principals) in &namespace_config.roles {
            let merged = match entry.roles.get(role_name) {
                Some(existing) => append_if_unique(principals, existing),
                None => principals.clone(),
            };
            entry.roles.insert(role_name.clone(), merged);
        }

        for (permission_name, roles) in &namespace_config.permissions {
            let existing = entry
                .permissions
                .get(permission_name)
                .cloned()
                .unwrap_or_default();
            entry
                .permissions
                .insert(permission_name.clone(), append_if_unique(roles, &existing));
        }

        entry.namespace_type = namespace_config.namespace_type;
        entry.inherited_namespaces = append_if_unique(
            &entry.inherited_namespaces,
            &namespace_config.inherited_namespaces,
        );
    }

    combined
}

/// System namespaces every deployment carries.
pub fn predefined_system_namespaces() -> NamespaceConfigMap {
    let mut namespaces = NamespaceConfigMap::new();

    namespaces.insert(
        USER_PRINCIPAL.to_string(),
        NamespaceConfig::new(NamespaceType::System),
    );

    namespaces.insert(
        ORGANIZATION_NAMESPACE.to_string(),
        NamespaceConfig::new(NamespaceType::System)
            .with_role("admin", &[USER_PRINCIPAL, GROUP_PRINCIPAL])
            .with_role("member", &[USER_PRINCIPAL, GROUP_PRINCIPAL])
            .with_permission("edit", &["admin"])
            .with_permission("view", &["admin", "member"])
            .with_permission("delete", &["admin"]),
    );

    namespaces.insert(
        PROJECT_NAMESPACE.to_string(),
        NamespaceConfig::new(NamespaceType::System)
            .inherits(ORGANIZATION_RELATION_NAME, ORGANIZATION_NAMESPACE)
            .with_role("admin", &[USER_PRINCIPAL, GROUP_PRINCIPAL])
            .with_role("viewer", &[USER_PRINCIPAL, GROUP_PRINCIPAL])
            .with_permission("edit", &["admin", "organization:admin"])
            .with_permission(
                "view",
                &["admin", "viewer", "organization:admin", "organization:member"],
            )
            .with_permission("delete", &["admin", "organization:admin"]),
    );

    namespaces.insert(
        GROUP_NAMESPACE.to_string(),
        NamespaceConfig::new(NamespaceType::System)
            .inherits(ORGANIZATION_RELATION_NAME, ORGANIZATION_NAMESPACE)
            .with_role("manager", &[USER_PRINCIPAL])
            .with_role("member", &[USER_PRINCIPAL])
            .with_permission(MEMBERSHIP_PERMISSION, &["member", "manager"])
            .with_permission("edit", &["manager", "organization:admin"])
            .with_permission("view", &["member", "manager", "organization:admin"])
            .with_permission("delete", &["manager", "organization:admin"]),
    );

    namespaces
}

/// Roles and permissions merged into every resource-group namespace.
pub fn predefined_resource_group_namespace() -> NamespaceConfig {
    NamespaceConfig::new(NamespaceType::ResourceGroup)
        .inherits(ORGANIZATION_RELATION_NAME, ORGANIZATION_NAMESPACE)
        .inherits(PROJECT_RELATION_NAME, PROJECT_NAMESPACE)
        .with_role("owner", &[USER_PRINCIPAL, GROUP_PRINCIPAL])
        .with_role("editor", &[USER_PRINCIPAL, GROUP_PRINCIPAL])
        .with_role("viewer", &[USER_PRINCIPAL, GROUP_PRINCIPAL])
        .with_permission(
            "edit",
            &["owner", "editor", "project:admin", "organization:admin"],
        )
        .with_permission(
            "view",
            &[
                "owner",
                "editor",
                "viewer",
                "project:admin",
                "project:viewer",
                "organization:admin",
            ],
        )
        .with_permission("delete", &["owner", "project:admin", "organization:admin"])
}

/// Combine configured namespaces with the predefined ones and give every
/// resource-group namespace the predefined resource roles.
pub fn with_predefined_namespaces(configured: &NamespaceConfigMap) -> NamespaceConfigMap {
    let mut combined = merge_namespace_config_maps(configured, &predefined_system_namespaces());

    let resource_groups: Vec<String> = combined
        .iter()
        .filter(|(_, config)| config.namespace_type == NamespaceType::ResourceGroup)
        .map(|(name, _)| name.clone())
        .collect();

    for name in resource_groups {
        let mut predefined = NamespaceConfigMap::new();
        predefined.insert(name, predefined_resource_group_namespace());
        combined = merge_namespace_config_maps(&combined, &predefined);
    }

    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_if_unique() {
        let merged = append_if_unique(
            &["1".to_string(), "2".to_string(), "3".to_string()],
            &["3".to_string(), "4".to_string()],
        );
        assert_eq!(merged, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_role_name_strips_namespace() {
        assert_eq!(role_name("group:member"), "member");
        assert_eq!(role_name("entropy/firehose:owner"), "owner");
        assert_eq!(role_name("member"), "member");
        assert_eq!(role_id("group", "member"), "group:member");
    }

    #[test]
    fn test_role_reference_parse() {
        assert_eq!(RoleReference::parse("member"), RoleReference::Local("member"));
        assert_eq!(
            RoleReference::parse("organization:admin"),
            RoleReference::Inherited {
                namespace: "organization",
                role: "admin"
            }
        );
    }

    #[test]
    fn test_merge_unions_roles_and_permissions() {
        let mut small = NamespaceConfigMap::new();
        small.insert(
            "group".to_string(),
            NamespaceConfig::new(NamespaceType::System)
                .with_role("member", &["user"])
                .with_permission("view", &["member"]),
        );
        let mut large = NamespaceConfigMap::new();
        large.insert(
            "group".to_string(),
            NamespaceConfig::new(NamespaceType::System)
                .with_role("member", &["group"])
                .with_role("manager", &["user"])
                .with_permission("view", &["manager"]),
        );

        let merged = merge_namespace_config_maps(&small, &large);
        let group = &merged["group"];

        let mut principals = group.roles["member"].clone();
        principals.sort();
        assert_eq!(principals, vec!["group", "user"]);
        assert!(group.roles.contains_key("manager"));

        let mut view = group.permissions["view"].clone();
        view.sort();
        assert_eq!(view, vec!["manager", "member"]);
    }

    #[test]
    fn test_resource_groups_receive_predefined_roles() {
        let mut configured = NamespaceConfigMap::new();
        configured.insert(
            "entropy/firehose".to_string(),
            NamespaceConfig::new(NamespaceType::ResourceGroup)
                .with_role("sink_editor", &["user"])
                .with_permission("sink_edit", &["sink_editor", "owner"]),
        );

        let combined = with_predefined_namespaces(&configured);
        let firehose = &combined["entropy/firehose"];

        assert!(firehose.roles.contains_key("owner"));
        assert!(firehose.roles.contains_key("sink_editor"));
        assert_eq!(firehose.inherited_namespaces.len(), 2);
        assert!(combined.contains_key(ORGANIZATION_NAMESPACE));
        assert!(combined.contains_key(GROUP_NAMESPACE));
    }
}
