use thiserror::Error;

/// Configuration errors raised while compiling namespace models.
///
/// These are programmer errors: a batch that fails here must stop startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("role '{role}' referenced by permission '{permission}' is not defined in namespace '{namespace}'")]
    UnknownRole {
        namespace: String,
        permission: String,
        role: String,
    },

    #[error("principal type '{principal}' of role '{role}' in namespace '{namespace}' is unknown")]
    UnknownPrincipal {
        namespace: String,
        role: String,
        principal: String,
    },

    #[error("namespace '{namespace}' inherits from unknown namespace '{inherited}'")]
    UnknownInheritedNamespace { namespace: String, inherited: String },

    #[error("permission '{permission}' in namespace '{namespace}' is not granted by any role")]
    EmptyPermission { namespace: String, permission: String },

    #[error("'{name}' is defined more than once in namespace '{namespace}'")]
    DuplicateMember { namespace: String, name: String },

    #[error("invalid schema config: {0}")]
    InvalidConfig(String),
}

#[derive(Error, Debug)]
pub enum ZanzibarError {
    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    #[error("Invalid relation detail: {0}")]
    InvalidDetail(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Graph backend error: {0}")]
    Backend(#[from] tonic::Status),

    #[error("Maximum recursion depth exceeded")]
    MaxRecursionDepthExceeded,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl ZanzibarError {
    /// Backend status code, when the failure came from the graph backend.
    pub fn backend_code(&self) -> Option<tonic::Code> {
        match self {
            ZanzibarError::Backend(status) => Some(status.code()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ZanzibarError>;
