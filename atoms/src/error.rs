use thiserror::Error;

/// Failures reported by a `DocumentStore` implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A write condition (exists / not exists / field equals) did not hold.
    #[error("write condition failed")]
    ConditionFailed,

    /// Transient I/O failure. Idempotent operations may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed document {key}: {reason}")]
    Malformed { key: String, reason: String },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Domain error taxonomy surfaced by every service in this workspace.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("username '{0}' is already taken")]
    AlreadyTaken(String),

    #[error("invalid username '{0}': use 3-20 letters, digits, '_' or '.'")]
    InvalidUsername(String),

    #[error("no user with username '{0}'")]
    UserNotFound(String),

    #[error("invite has already been answered")]
    AlreadyResolved,

    #[error("user is already a member of this group")]
    AlreadyMember,

    #[error("{0} not found")]
    NotFound(String),

    #[error("only the group host can do this")]
    NotHost,

    #[error("user is not a member of this group")]
    NotAMember,

    #[error("the group host cannot be removed")]
    HostCannotBeKicked,

    #[error("the default task group cannot be deleted")]
    DefaultGroupProtected,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("malformed record: {0}")]
    Malformed(String),
}

impl CoreError {
    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::AlreadyTaken(_) => "AlreadyTaken",
            CoreError::InvalidUsername(_) => "InvalidUsername",
            CoreError::UserNotFound(_) => "UserNotFound",
            CoreError::AlreadyResolved => "AlreadyResolved",
            CoreError::AlreadyMember => "AlreadyMember",
            CoreError::NotFound(_) => "NotFound",
            CoreError::NotHost => "NotHost",
            CoreError::NotAMember => "NotAMember",
            CoreError::HostCannotBeKicked => "HostCannotBeKicked",
            CoreError::DefaultGroupProtected => "DefaultGroupProtected",
            CoreError::InvalidInput(_) => "InvalidInput",
            CoreError::Conflict(_) => "Conflict",
            CoreError::StoreUnavailable(_) => "StoreUnavailable",
            CoreError::Malformed(_) => "Malformed",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable(_))
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConditionFailed => CoreError::Conflict("write condition failed".to_string()),
            StoreError::Unavailable(msg) => CoreError::StoreUnavailable(msg),
            StoreError::Malformed { key, reason } => CoreError::Malformed(format!("{}: {}", key, reason)),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
