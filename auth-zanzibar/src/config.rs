//! YAML resource configuration that describes namespaces declaratively.
//!
//! ```yaml
//! entropy:
//!   type: resource_group
//!   resource_types:
//!     - name: firehose
//!       roles:
//!         - name: sink_editor
//!           principals: [user, group]
//!       permissions:
//!         - name: sink_edit
//!           roles: [sink_editor, owner]
//! ```

use crate::error::SchemaError;
use crate::schema::{NamespaceConfig, NamespaceConfigMap, NamespaceType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const RESOURCE_GROUP_TYPE: &str = "resource_group";
pub const SYSTEM_TYPE: &str = "system";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    #[serde(default)]
    pub principals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionConfig {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTypeConfig {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub permissions: Vec<PermissionConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(rename = "type", default)]
    pub config_type: String,
    #[serde(default)]
    pub resource_types: Vec<ResourceTypeConfig>,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub permissions: Vec<PermissionConfig>,
}

pub fn parse_config_yaml(content: &str) -> Result<HashMap<String, ResourceConfig>, SchemaError> {
    serde_yaml::from_str(content).map_err(|e| SchemaError::InvalidConfig(e.to_string()))
}

/// Build a single namespace. A resource type turns the name into
/// `<name>/<resource_type>` and marks it as a resource-group namespace.
pub fn namespace_from_config(
    name: &str,
    roles: &[RoleConfig],
    permissions: &[PermissionConfig],
    resource_type: Option<&str>,
) -> (String, NamespaceConfig) {
    let namespace_type = if resource_type.is_some() {
        NamespaceType::ResourceGroup
    } else {
        NamespaceType::System
    };
    let mut config = NamespaceConfig::new(namespace_type);

    for role in roles {
        config.roles.insert(role.name.clone(), role.principals.clone());
    }
    for permission in permissions {
        config
            .permissions
            .insert(permission.name.clone(), permission.roles.clone());
    }

    let namespace_name = match resource_type {
        Some(resource_type) => format!("{}/{}", name, resource_type),
        None => name.to_string(),
    };
    (namespace_name, config)
}

pub fn namespaces_for_resource_group(name: &str, config: &ResourceConfig) -> NamespaceConfigMap {
    config
        .resource_types
        .iter()
        .map(|resource_type| {
            namespace_from_config(
                name,
                &resource_type.roles,
                &resource_type.permissions,
                Some(&resource_type.name),
            )
        })
        .collect()
}

pub fn namespaces_from_resource_config(
    configs: &HashMap<String, ResourceConfig>,
) -> Result<NamespaceConfigMap, SchemaError> {
    let mut namespaces = NamespaceConfigMap::new();

    for (name, config) in configs {
        match config.config_type.as_str() {
            RESOURCE_GROUP_TYPE => {
                namespaces.extend(namespaces_for_resource_group(name, config));
            }
            SYSTEM_TYPE | "" => {
                let (namespace_name, namespace) =
                    namespace_from_config(name, &config.roles, &config.permissions, None);
                namespaces.insert(namespace_name, namespace);
            }
            other => {
                return Err(SchemaError::InvalidConfig(format!(
                    "resource config '{}' has unsupported type '{}'",
                    name, other
                )));
            }
        }
    }

    Ok(namespaces)
}
