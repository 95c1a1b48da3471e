//! Error metadata module
//!
//! Every crate in the workspace defines its own `thiserror` enum. Errors that
//! reach a pipeline report or a log line implement [`ErrorMetadata`] so they are
//! described the same way everywhere.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected outcomes like admission rejections
    Debug,
    /// Warning level - for per-object failures caused by the input
    Warn,
    /// Error level - for infrastructure failures
    Error,
}

/// Metadata describing how an error is reported.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "TRANSFER_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether invoking the pipeline again for the same object may succeed
    fn is_recoverable(&self) -> bool;

    /// Message safe to put into a report (no credentials or URLs with tokens)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Emit a tracing event at the level the error asks for.
#[macro_export]
macro_rules! log_at_level {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            $crate::error::LogLevel::Debug => ::tracing::debug!($($arg)+),
            $crate::error::LogLevel::Warn => ::tracing::warn!($($arg)+),
            $crate::error::LogLevel::Error => ::tracing::error!($($arg)+),
        }
    };
}
