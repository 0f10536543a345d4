//! Tagged-union request/response types, and the per-action error sum
//! type that crosses the parse/evaluate boundary.
//!
//! Replaces the reference implementation's C enum-plus-union tagged
//! unions with ordinary Rust sum types; verb dispatch in [`evaluate`]
//! matches exhaustively instead of falling through a `switch`.

pub mod evaluate;
pub mod parse;
pub mod response;

pub use parse::{parse_action, split_request};
pub use response::Response;

use chrono::{DateTime, Utc};

use crate::model::{Constr, UserId};

/// One parsed request action. `Error` carries a parse-time failure and
/// short-circuits evaluation for that one action only — sibling actions
/// in the same request array still run.
#[derive(Debug, Clone)]
pub enum Action {
    Whois { constr: Constr, user: UserId },
    Send { constr: Constr, dest: UserId, content: String },
    Motd { constr: Constr },
    Inbox { constr: Constr, page: i64 },
    Outbox { constr: Constr, page: i64 },
    Edit { constr: Constr, msg_id: i32, new_content: String },
    Rm { constr: Constr, msg_id: i32 },
    Block { constr: Constr, user: UserId },
    Unblock { constr: Constr, user: UserId },
    Ban { constr: Constr, user: UserId },
    Unban { constr: Constr, user: UserId },
    Error(ActionError),
}

/// The error sub-kinds of §7's taxonomy.
#[derive(Debug, Clone)]
pub enum ActionErrorKind {
    MissingKey,
    TypeMismatch,
    InvalidValue,
    RateLimit { next_request_at: DateTime<Utc> },
    InvariantViolation { name: &'static str },
    Other { status: u16 },
}

impl ActionErrorKind {
    pub fn status(&self) -> u16 {
        match self {
            ActionErrorKind::MissingKey
            | ActionErrorKind::TypeMismatch
            | ActionErrorKind::InvalidValue
            | ActionErrorKind::InvariantViolation { .. } => 400,
            ActionErrorKind::RateLimit { .. } => 429,
            ActionErrorKind::Other { status } => *status,
        }
    }
}

/// A failure located at a precise point in the request, per §4.1's
/// "error locality" — `location` reads `"<verb>.with.<arg>"`,
/// `"action.do"`, `"action.with"`, or `"request"`.
#[derive(Debug, Clone)]
pub struct ActionError {
    pub location: String,
    pub kind: ActionErrorKind,
}

impl ActionError {
    pub fn missing_key(location: impl Into<String>) -> Self {
        Self { location: location.into(), kind: ActionErrorKind::MissingKey }
    }

    pub fn type_mismatch(location: impl Into<String>) -> Self {
        Self { location: location.into(), kind: ActionErrorKind::TypeMismatch }
    }

    pub fn invalid_value(location: impl Into<String>) -> Self {
        Self { location: location.into(), kind: ActionErrorKind::InvalidValue }
    }

    pub fn other(location: impl Into<String>, status: u16) -> Self {
        Self { location: location.into(), kind: ActionErrorKind::Other { status } }
    }

    pub fn invariant(location: impl Into<String>, name: &'static str) -> Self {
        Self { location: location.into(), kind: ActionErrorKind::InvariantViolation { name } }
    }

    pub fn rate_limit(location: impl Into<String>, next_request_at: DateTime<Utc>) -> Self {
        Self { location: location.into(), kind: ActionErrorKind::RateLimit { next_request_at } }
    }
}

fn location(prefix: &str, key: &str) -> String {
    format!("{prefix}.with.{key}")
}
