//! Schema compiler: namespace models to backend schema definitions.
//!
//! Each namespace compiles to one independent `definition` block:
//!
//! ```text
//! definition group {
//! 	relation member: user | group#membership
//! 	relation organization: organization
//! 	permission edit = member + organization->admin
//! }
//! ```
//!
//! The whole batch is validated before anything is rendered, so a single
//! bad namespace fails every fragment.

use crate::error::SchemaError;
use crate::schema::{
    NamespaceConfig, NamespaceConfigMap, RoleReference, BUILTIN_PRINCIPALS, GROUP_PRINCIPAL,
    MEMBERSHIP_PERMISSION,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A subject type allowed on a relation, optionally narrowed to a userset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllowedSubject {
    pub object_type: String,
    pub relation: Option<String>,
}

impl AllowedSubject {
    /// Group principals are only ever linked through their membership permission.
    pub fn from_principal(principal: &str) -> Self {
        let relation = if principal == GROUP_PRINCIPAL {
            Some(MEMBERSHIP_PERMISSION.to_string())
        } else {
            None
        };
        Self {
            object_type: principal.to_string(),
            relation,
        }
    }
}

impl fmt::Display for AllowedSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.relation {
            Some(ref relation) => write!(f, "{}#{}", self.object_type, relation),
            None => write!(f, "{}", self.object_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
    pub allowed: Vec<AllowedSubject>,
}

impl RelationDefinition {
    pub fn allows(&self, object_type: &str, relation: Option<&str>) -> bool {
        self.allowed
            .iter()
            .any(|a| a.object_type == object_type && a.relation.as_deref() == relation)
    }
}

impl fmt::Display for RelationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let allowed: Vec<String> = self.allowed.iter().map(|a| a.to_string()).collect();
        write!(f, "relation {}: {}", self.name, allowed.join(" | "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Userset {
    /// A relation or permission on the same object.
    Computed(String),
    /// Follow `tupleset` to a related object and evaluate `computed` there.
    TupleToUserset { tupleset: String, computed: String },
}

impl fmt::Display for Userset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Userset::Computed(name) => write!(f, "{}", name),
            Userset::TupleToUserset { tupleset, computed } => {
                write!(f, "{}->{}", tupleset, computed)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    pub name: String,
    pub union: Vec<Userset>,
}

impl fmt::Display for PermissionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let union: Vec<String> = self.union.iter().map(|u| u.to_string()).collect();
        write!(f, "permission {} = {}", self.name, union.join(" + "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub relations: Vec<RelationDefinition>,
    pub permissions: Vec<PermissionDefinition>,
}

impl Definition {
    pub fn relation(&self, name: &str) -> Option<&RelationDefinition> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn permission(&self, name: &str) -> Option<&PermissionDefinition> {
        self.permissions.iter().find(|p| p.name == name)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.relation(name).is_some() || self.permission(name).is_some()
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relations.is_empty() && self.permissions.is_empty() {
            return write!(f, "definition {} {{}}", self.name);
        }
        writeln!(f, "definition {} {{", self.name)?;
        for relation in &self.relations {
            writeln!(f, "\t{}", relation)?;
        }
        for permission in &self.permissions {
            writeln!(f, "\t{}", permission)?;
        }
        write!(f, "}}")
    }
}

/// Compile every namespace of the batch, failing on the first invalid one.
pub fn compile(namespaces: &NamespaceConfigMap) -> Result<Vec<Definition>, SchemaError> {
    let known_principals: HashSet<&str> = BUILTIN_PRINCIPALS
        .iter()
        .copied()
        .chain(namespaces.keys().map(String::as_str))
        .collect();

    let mut entries: Vec<(&String, &NamespaceConfig)> = namespaces.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    entries
        .into_iter()
        .map(|(name, config)| compile_namespace(name, config, namespaces, &known_principals))
        .collect()
}

/// Render the batch as schema-language fragments, one per namespace.
pub fn generate_schema(namespaces: &NamespaceConfigMap) -> Result<Vec<String>, SchemaError> {
    Ok(compile(namespaces)?
        .iter()
        .map(|definition| definition.to_string())
        .collect())
}

fn compile_namespace(
    name: &str,
    config: &NamespaceConfig,
    batch: &NamespaceConfigMap,
    known_principals: &HashSet<&str>,
) -> Result<Definition, SchemaError> {
    let mut relations = Vec::with_capacity(config.roles.len() + config.inherited_namespaces.len());
    let mut members: HashSet<String> = HashSet::new();
    let mut claim = |member: &str| -> Result<(), SchemaError> {
        if members.insert(member.to_string()) {
            Ok(())
        } else {
            Err(SchemaError::DuplicateMember {
                namespace: name.to_string(),
                name: member.to_string(),
            })
        }
    };

    let mut roles: Vec<(&String, &Vec<String>)> = config.roles.iter().collect();
    roles.sort_by(|a, b| a.0.cmp(b.0));
    for (role, principals) in roles {
        claim(role)?;
        let mut allowed = Vec::new();
        for principal in principals {
            if !known_principals.contains(principal.as_str()) {
                return Err(SchemaError::UnknownPrincipal {
                    namespace: name.to_string(),
                    role: role.clone(),
                    principal: principal.clone(),
                });
            }
            let subject = AllowedSubject::from_principal(principal);
            if !allowed.contains(&subject) {
                allowed.push(subject);
            }
        }
        relations.push(RelationDefinition {
            name: role.clone(),
            allowed,
        });
    }

    for inherited in &config.inherited_namespaces {
        if !batch.contains_key(&inherited.namespace_id) {
            return Err(SchemaError::UnknownInheritedNamespace {
                namespace: name.to_string(),
                inherited: inherited.namespace_id.clone(),
            });
        }
        claim(&inherited.name)?;
        relations.push(RelationDefinition {
            name: inherited.name.clone(),
            allowed: vec![AllowedSubject {
                object_type: inherited.namespace_id.clone(),
                relation: None,
            }],
        });
    }

    let mut entries: Vec<(&String, &Vec<String>)> = config.permissions.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut permissions = Vec::with_capacity(entries.len());
    for (permission, references) in entries {
        claim(permission)?;
        if references.is_empty() {
            return Err(SchemaError::EmptyPermission {
                namespace: name.to_string(),
                permission: permission.clone(),
            });
        }

        let mut union = Vec::with_capacity(references.len());
        for reference in references {
            let userset = resolve_reference(name, permission, reference, config, batch)?;
            if !union.contains(&userset) {
                union.push(userset);
            }
        }
        permissions.push(PermissionDefinition {
            name: permission.clone(),
            union,
        });
    }

    Ok(Definition {
        name: name.to_string(),
        relations,
        permissions,
    })
}

fn resolve_reference(
    namespace: &str,
    permission: &str,
    reference: &str,
    config: &NamespaceConfig,
    batch: &NamespaceConfigMap,
) -> Result<Userset, SchemaError> {
    let unknown = || SchemaError::UnknownRole {
        namespace: namespace.to_string(),
        permission: permission.to_string(),
        role: reference.to_string(),
    };

    match RoleReference::parse(reference) {
        RoleReference::Local(role) => {
            if config.roles.contains_key(role) {
                Ok(Userset::Computed(role.to_string()))
            } else {
                Err(unknown())
            }
        }
        RoleReference::Inherited {
            namespace: parent,
            role,
        } if parent == namespace => {
            if config.roles.contains_key(role) {
                Ok(Userset::Computed(role.to_string()))
            } else {
                Err(unknown())
            }
        }
        RoleReference::Inherited {
            namespace: parent,
            role,
        } => {
            let inherited = config
                .inherited_namespaces
                .iter()
                .find(|i| i.namespace_id == parent)
                .ok_or_else(unknown)?;
            let parent_config = batch.get(parent).ok_or_else(|| {
                SchemaError::UnknownInheritedNamespace {
                    namespace: namespace.to_string(),
                    inherited: parent.to_string(),
                }
            })?;
            if !parent_config.roles.contains_key(role)
                && !parent_config.permissions.contains_key(role)
            {
                return Err(unknown());
            }
            Ok(Userset::TupleToUserset {
                tupleset: inherited.name.clone(),
                computed: role.to_string(),
            })
        }
    }
}
