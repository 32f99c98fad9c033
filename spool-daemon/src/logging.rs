//! Structured logging macros for the spool daemon
//!
//! With structured output enabled (`SPOOL_LOG_JSON=1`), each entry is one
//! JSON object on stderr. Otherwise the same message and context go through
//! the `log` facade, so `RUST_LOG` filtering applies.
//!
//! # Example
//! ```ignore
//! log_info!("Command invoked", {
//!     request_id: id,
//!     path: path.join(" ")
//! });
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

static STRUCTURED: AtomicBool = AtomicBool::new(false);

/// Initialise `env_logger` and choose the output format for the macros
pub fn init(structured: bool) {
    STRUCTURED.store(structured, Ordering::Relaxed);
    // A second init (tests, embedding) is harmless
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

#[must_use]
pub fn structured_enabled() -> bool {
    STRUCTURED.load(Ordering::Relaxed)
}

/// Generate ISO 8601 timestamp
///
/// # Panics
/// Panics if system time is before UNIX epoch (should never happen on modern systems)
#[allow(clippy::expect_used)]
pub fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System time before UNIX epoch");
    #[allow(clippy::cast_possible_wrap)]
    let datetime = chrono::DateTime::from_timestamp(now.as_secs() as i64, now.subsec_nanos())
        .expect("Invalid timestamp");
    datetime.to_rfc3339()
}

/// Generate unique error ID for tracking
///
/// # Panics
/// Panics if system time is before UNIX epoch (should never happen on modern systems)
#[allow(clippy::expect_used)]
pub fn generate_error_id() -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System time before UNIX epoch");
    format!("ERR-{:x}", now.as_millis())
}

/// Build one structured entry
#[must_use]
pub fn entry(level: &str, message: &str, context: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "timestamp": timestamp(),
        "level": level,
        "message": message,
        "context": context
    })
}

/// Log structured INFO message
#[macro_export]
macro_rules! log_info {
    ($msg:expr, { $($key:ident: $val:expr),* $(,)? }) => {{
        let context = serde_json::json!({
            $(stringify!($key): $val,)*
        });
        if $crate::logging::structured_enabled() {
            eprintln!("{}", $crate::logging::entry("INFO", &$msg, context));
        } else {
            log::info!("{} {}", $msg, context);
        }
    }};
}

/// Log structured WARN message
#[macro_export]
macro_rules! log_warn {
    ($msg:expr, { $($key:ident: $val:expr),* $(,)? }) => {{
        let context = serde_json::json!({
            $(stringify!($key): $val,)*
        });
        if $crate::logging::structured_enabled() {
            eprintln!("{}", $crate::logging::entry("WARN", &$msg, context));
        } else {
            log::warn!("{} {}", $msg, context);
        }
    }};
}

/// Log structured ERROR message
#[macro_export]
macro_rules! log_error {
    ($msg:expr, $err:expr, { $($key:ident: $val:expr),* $(,)? }) => {{
        let error_id = $crate::logging::generate_error_id();
        let context = serde_json::json!({
            "errorId": error_id,
            "errorMessage": format!("{}", $err),
            $(stringify!($key): $val,)*
        });
        if $crate::logging::structured_enabled() {
            eprintln!("{}", $crate::logging::entry("ERROR", &$msg, context));
        } else {
            log::error!("{} {}", $msg, context);
        }
    }};
}
