/// Broad failure category, used to pick the process exit code and to let
/// callers branch on what went wrong without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing/invalid local configuration (API key, CLI values).
    Config,
    /// Caller passed arguments outside the documented contract.
    Contract,
    /// HTTP 403 from the extract API.
    Permission,
    /// Any other transport failure or non-2xx response.
    Http,
    /// Response or file did not have the expected shape.
    Format,
    /// The extract ended as `failed` or `canceled`.
    RemoteFailed,
    /// Polling exceeded its wall-clock budget.
    Timeout,
    /// Local filesystem error.
    Io,
    /// Model evaluation failed (bad posterior, unknown level, ...).
    Model,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Config | ErrorKind::Contract => 2,
            ErrorKind::Io => 3,
            ErrorKind::Permission
            | ErrorKind::Http
            | ErrorKind::Format
            | ErrorKind::RemoteFailed
            | ErrorKind::Timeout => 4,
            ErrorKind::Model => 5,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn contract(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Contract, message)
    }

    pub fn http(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Http, message)
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Model, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code())
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
