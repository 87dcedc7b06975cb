use auth_zanzibar::ZanzibarError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Group does not exist")]
    GroupNotFound,

    #[error("User does not exist")]
    UserNotFound,

    #[error("Group slug '{0}' already exists")]
    SlugConflict(String),

    #[error("Invalid group detail: {0}")]
    InvalidDetail(String),

    #[error("Cached value for '{0}' has an unexpected type")]
    Parsing(String),

    #[error("Unable to resolve the acting user: {0}")]
    InvalidActor(String),

    #[error("Group relation could not be written: {0}")]
    RelationWrite(#[source] ZanzibarError),

    #[error("Error while listing group relations: {0}")]
    ListingGroupRelations(#[source] Box<IdentityError>),

    #[error("Error while fetching users: {0}")]
    FetchingUsers(#[source] Box<IdentityError>),

    #[error("Error while fetching groups: {0}")]
    FetchingGroups(#[source] Box<IdentityError>),

    #[error("Audit data encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Repository error: {0}")]
    Repository(String),
}

pub type Result<T> = std::result::Result<T, IdentityError>;
