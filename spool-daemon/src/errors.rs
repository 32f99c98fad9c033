// errors.rs - Structured error handling with typed error domains
//
// Every failure the registry or the client can produce is a `SpoolError`.
// Errors carry a domain and a stable code so callers on the far side of the
// IPC socket can decide how to present them without parsing messages.
//
// Handler failures are NOT routed through this type while inside the
// process: the registry hands the handler's `anyhow::Error` back unchanged.
// Conversion happens only at the IPC boundary (see `From<anyhow::Error>`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error domains categorize errors by the stage that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    /// Registration-time failures (name collisions, malformed names)
    Registration,

    /// Resolution-time failures (unknown path segment)
    Resolution,

    /// Invocation-time argument binding failures
    Binding,

    /// Execution client failures (bad paths, missing files, host I/O)
    Client,

    /// IPC communication errors (malformed requests, serialization)
    Ipc,

    /// Configuration errors (invalid environment values)
    Configuration,

    /// Internal errors and handler failures surfaced at the boundary
    Internal,
}

impl ErrorDomain {
    /// Returns true if errors in this domain are typically recoverable with retry
    #[must_use]
    pub fn is_typically_recoverable(self) -> bool {
        matches!(self, ErrorDomain::Ipc | ErrorDomain::Client)
    }
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDomain::Registration => write!(f, "registration"),
            ErrorDomain::Resolution => write!(f, "resolution"),
            ErrorDomain::Binding => write!(f, "binding"),
            ErrorDomain::Client => write!(f, "client"),
            ErrorDomain::Ipc => write!(f, "ipc"),
            ErrorDomain::Configuration => write!(f, "configuration"),
            ErrorDomain::Internal => write!(f, "internal"),
        }
    }
}

/// Error codes provide fine-grained error identification within a domain.
///
/// These codes are stable and can be used for programmatic error handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode(pub String);

impl ErrorCode {
    // Registration
    pub const DUPLICATE_NAME: &'static str = "DUPLICATE_NAME";
    pub const INVALID_NAME: &'static str = "INVALID_NAME";

    // Resolution
    pub const NOT_FOUND: &'static str = "NOT_FOUND";

    // Binding
    pub const ARGUMENT_BINDING: &'static str = "ARGUMENT_BINDING";

    // Client
    pub const CLIENT_INVALID_PATH: &'static str = "CLIENT_INVALID_PATH";
    pub const CLIENT_NOT_FOUND: &'static str = "CLIENT_NOT_FOUND";
    pub const CLIENT_PATH_CONFLICT: &'static str = "CLIENT_PATH_CONFLICT";
    pub const CLIENT_IO: &'static str = "CLIENT_IO";

    // IPC
    pub const IPC_PROTOCOL_ERROR: &'static str = "IPC_PROTOCOL_ERROR";

    // Configuration
    pub const CONFIG_INVALID_VALUE: &'static str = "CONFIG_INVALID_VALUE";
    pub const CONFIG_MISSING_HOME: &'static str = "CONFIG_MISSING_HOME";

    // Internal
    pub const INTERNAL_HANDLER_FAILED: &'static str = "INTERNAL_HANDLER_FAILED";
    pub const INTERNAL_UNEXPECTED_STATE: &'static str = "INTERNAL_UNEXPECTED_STATE";
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ErrorCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Coarse classification of a `SpoolError`, derived from its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DuplicateName,
    InvalidName,
    NotFound,
    ArgumentBinding,
    InvalidPath,
    MissingPath,
    PathConflict,
    Io,
    Protocol,
    Configuration,
    Internal,
}

/// Structured error that serializes cleanly across IPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolError {
    /// The error domain (categorizes the error source)
    pub domain: ErrorDomain,

    /// Stable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Whether the error is potentially recoverable with retry
    pub recoverable: bool,

    /// Optional additional context (paths, names, raw values)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Optional hint for recovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_hint: Option<String>,
}

impl SpoolError {
    /// Creates a new error with required fields
    #[must_use]
    pub fn new(
        domain: ErrorDomain,
        code: impl Into<ErrorCode>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            code: code.into(),
            message: message.into(),
            recoverable: domain.is_typically_recoverable(),
            details: None,
            recovery_hint: None,
        }
    }

    /// Sets the recoverable flag
    #[must_use]
    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Adds additional details to the error
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Adds a recovery hint
    #[must_use]
    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.code.0.as_str() {
            ErrorCode::DUPLICATE_NAME => ErrorKind::DuplicateName,
            ErrorCode::INVALID_NAME => ErrorKind::InvalidName,
            ErrorCode::NOT_FOUND => ErrorKind::NotFound,
            ErrorCode::ARGUMENT_BINDING => ErrorKind::ArgumentBinding,
            ErrorCode::CLIENT_INVALID_PATH => ErrorKind::InvalidPath,
            ErrorCode::CLIENT_NOT_FOUND => ErrorKind::MissingPath,
            ErrorCode::CLIENT_PATH_CONFLICT => ErrorKind::PathConflict,
            ErrorCode::CLIENT_IO => ErrorKind::Io,
            ErrorCode::IPC_PROTOCOL_ERROR => ErrorKind::Protocol,
            ErrorCode::CONFIG_INVALID_VALUE | ErrorCode::CONFIG_MISSING_HOME => {
                ErrorKind::Configuration
            }
            _ => ErrorKind::Internal,
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// A name already exists in the scope it is being registered into
    #[must_use]
    pub fn duplicate_name(scope: &str, name: &str) -> Self {
        Self::new(
            ErrorDomain::Registration,
            ErrorCode::DUPLICATE_NAME,
            format!("'{name}' is already registered in '{scope}'"),
        )
        .with_details(serde_json::json!({ "scope": scope, "name": name }))
    }

    #[must_use]
    pub fn invalid_name(name: &str, reason: &str) -> Self {
        Self::new(
            ErrorDomain::Registration,
            ErrorCode::INVALID_NAME,
            format!("Invalid name '{name}': {reason}"),
        )
        .with_details(serde_json::json!({ "name": name, "reason": reason }))
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// No child named `segment` below the already-walked `path`
    #[must_use]
    pub fn not_found(path: &[String], segment: &str) -> Self {
        let scope = if path.is_empty() {
            "<root>".to_string()
        } else {
            path.join(" ")
        };
        Self::new(
            ErrorDomain::Resolution,
            ErrorCode::NOT_FOUND,
            format!("No command '{segment}' in '{scope}'"),
        )
        .with_details(serde_json::json!({ "path": path, "segment": segment }))
        .with_recovery_hint("List the available commands and check the spelling of each segment.")
    }

    /// The path was exhausted while still sitting on a group
    #[must_use]
    pub fn incomplete_path(path: &[String], available: &[&str]) -> Self {
        let scope = if path.is_empty() {
            "<root>".to_string()
        } else {
            path.join(" ")
        };
        Self::new(
            ErrorDomain::Resolution,
            ErrorCode::NOT_FOUND,
            format!("'{scope}' is a group; expected one of: {}", available.join(", ")),
        )
        .with_details(serde_json::json!({ "path": path, "available": available }))
    }

    // =========================================================================
    // Binding
    // =========================================================================

    fn binding(command: &str, message: String, details: serde_json::Value) -> Self {
        Self::new(ErrorDomain::Binding, ErrorCode::ARGUMENT_BINDING, message)
            .with_details(serde_json::json!({ "command": command, "argument": details }))
    }

    #[must_use]
    pub fn unknown_argument(command: &str, argument: &str) -> Self {
        Self::binding(
            command,
            format!("'{command}' has no parameter named '{argument}'"),
            serde_json::json!({ "name": argument, "problem": "unknown" }),
        )
    }

    #[must_use]
    pub fn missing_argument(command: &str, argument: &str) -> Self {
        Self::binding(
            command,
            format!("'{command}' requires argument '{argument}'"),
            serde_json::json!({ "name": argument, "problem": "missing" }),
        )
    }

    #[must_use]
    pub fn invalid_argument(command: &str, argument: &str, expected: &str, raw: &str) -> Self {
        Self::binding(
            command,
            format!("Argument '{argument}' of '{command}' expects {expected}, got '{raw}'"),
            serde_json::json!({
                "name": argument,
                "problem": "type",
                "expected": expected,
                "raw": raw
            }),
        )
    }

    #[must_use]
    pub fn duplicate_argument(argument: &str) -> Self {
        Self::new(
            ErrorDomain::Binding,
            ErrorCode::ARGUMENT_BINDING,
            format!("Argument '{argument}' given more than once"),
        )
        .with_details(serde_json::json!({ "argument": { "name": argument, "problem": "duplicate" } }))
    }

    /// A raw argument that is neither `key=value` nor `--key value`
    #[must_use]
    pub fn malformed_argument(raw: &str) -> Self {
        Self::new(
            ErrorDomain::Binding,
            ErrorCode::ARGUMENT_BINDING,
            format!("Cannot parse argument '{raw}'; use key=value or --key value"),
        )
        .with_details(serde_json::json!({ "argument": { "raw": raw, "problem": "syntax" } }))
    }

    #[must_use]
    pub fn context_required(command: &str) -> Self {
        Self::binding(
            command,
            format!("'{command}' needs an execution context but none was supplied"),
            serde_json::json!({ "name": "context", "problem": "missing" }),
        )
    }

    // =========================================================================
    // Client
    // =========================================================================

    #[must_use]
    pub fn client_invalid_path(path: &str, reason: &str) -> Self {
        Self::new(
            ErrorDomain::Client,
            ErrorCode::CLIENT_INVALID_PATH,
            format!("Invalid path '{path}': {reason}"),
        )
        .recoverable(false)
        .with_details(serde_json::json!({ "path": path, "reason": reason }))
    }

    #[must_use]
    pub fn client_not_found(path: &str) -> Self {
        Self::new(
            ErrorDomain::Client,
            ErrorCode::CLIENT_NOT_FOUND,
            format!("File or directory not found: {path}"),
        )
        .recoverable(false)
        .with_details(serde_json::json!({ "path": path }))
    }

    #[must_use]
    pub fn client_path_conflict(path: &str, reason: &str) -> Self {
        Self::new(
            ErrorDomain::Client,
            ErrorCode::CLIENT_PATH_CONFLICT,
            format!("Path conflict at '{path}': {reason}"),
        )
        .recoverable(false)
        .with_details(serde_json::json!({ "path": path, "reason": reason }))
    }

    #[must_use]
    pub fn client_io(path: &str, error: &str) -> Self {
        Self::new(
            ErrorDomain::Client,
            ErrorCode::CLIENT_IO,
            format!("I/O error at '{path}': {error}"),
        )
        .with_details(serde_json::json!({ "path": path, "error": error }))
    }

    // =========================================================================
    // IPC / configuration / internal
    // =========================================================================

    #[must_use]
    pub fn ipc_protocol(message: &str) -> Self {
        Self::new(ErrorDomain::Ipc, ErrorCode::IPC_PROTOCOL_ERROR, message.to_string())
            .recoverable(false)
    }

    #[must_use]
    pub fn config_invalid_value(key: &str, value: &str, expected: &str) -> Self {
        Self::new(
            ErrorDomain::Configuration,
            ErrorCode::CONFIG_INVALID_VALUE,
            format!("{key}={value} is not valid; expected {expected}"),
        )
        .with_details(serde_json::json!({ "key": key, "value": value }))
    }

    #[must_use]
    pub fn config_missing_home() -> Self {
        Self::new(
            ErrorDomain::Configuration,
            ErrorCode::CONFIG_MISSING_HOME,
            "No home directory for the default socket path",
        )
        .with_recovery_hint("Set SPOOL_SOCKET_PATH or pass --socket explicitly.")
    }

    /// An entry declared it yields a group but returned a plain value
    #[must_use]
    pub fn unexpected_outcome(command: &str) -> Self {
        Self::new(
            ErrorDomain::Internal,
            ErrorCode::INTERNAL_UNEXPECTED_STATE,
            format!("'{command}' is declared to return a group but returned a value"),
        )
        .recoverable(false)
        .with_details(serde_json::json!({ "command": command }))
    }
}

impl fmt::Display for SpoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.domain, self.code, self.message)
    }
}

impl std::error::Error for SpoolError {}

/// Converts an `anyhow::Error` into a `SpoolError` for transport.
///
/// Registry and client failures travel inside `anyhow::Error` untouched, so
/// they are recovered by downcasting. Anything else came from a handler and
/// is reported as `INTERNAL_HANDLER_FAILED` with the full context chain.
impl From<anyhow::Error> for SpoolError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(spool) = err.downcast_ref::<SpoolError>() {
            return spool.clone();
        }

        Self::new(
            ErrorDomain::Internal,
            ErrorCode::INTERNAL_HANDLER_FAILED,
            format!("{err:#}"),
        )
        .recoverable(false)
    }
}

/// Result type alias for registry and client operations
pub type SpoolResult<T> = Result<T, SpoolError>;
