//! Ambient error taxonomy: failures at the configuration and DAL
//! boundaries. Per-action failures (parse/evaluate) are a distinct sum
//! type — see [`crate::action::ActionError`] — because they are surfaced
//! to clients one action at a time rather than propagated with `?`.

use thiserror::Error;

/// Fatal startup failures: a missing required environment variable, an
/// unreadable or malformed configuration file, or a database that
/// refuses the initial connection. The process exits non-zero on these;
/// no partial response is ever emitted for them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("configuration file error")]
    File(#[from] config::ConfigError),

    #[error("ROOT_API_KEY is not a valid UUIDv4")]
    InvalidRootApiKey,
}

/// The three-way outcome every DAL call returns, per the DAL contract.
/// `NotFound` is "no such row", distinct from `Internal`, which is "the
/// operation failed and has already been logged" — callers never log
/// an `Internal` a second time.
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    NotFound,
    /// The failure has already been logged by the DAL; callers must not
    /// log it again.
    Internal,
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(f(v)),
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Internal => Outcome::Internal,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }
}

/// Logs a database failure at error level. Every DAL call funnels its
/// `sqlx::Error` through this single function before returning
/// [`Outcome::Internal`], so that "callers never log twice" holds by
/// construction.
pub fn log_db_err(operation: &str, err: impl std::fmt::Display) {
    tracing::error!(operation, error = %err, "database operation failed");
}
