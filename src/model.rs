//! The wire-independent data model: credentials, user identities and
//! records, messages, and the turnstile's per-IP entry.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::role::Role;

pub const EMAIL_LENGTH: usize = 319;
pub const PSEUDO_LENGTH: usize = 255;

/// The separator between the API key and an optional password in a wire
/// credential. A single codepoint, two UTF-8 bytes (`0xC2 0xA4`).
pub const CONSTR_SEPARATOR: char = '¤';

/// `{api_key, password}`, parsed from the wire form
/// `<36-char-uuid>[¤<password>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constr {
    pub api_key: Uuid,
    pub password: Option<String>,
}

/// `id=0` is the built-in root administrator; its credential lives in
/// configuration, never in the store.
pub const ROOT_USER_ID: UserId = 0;

pub type UserId = i32;

/// `{id, role}`, the result of authenticating a [`Constr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: UserId,
    pub role: Role,
}

/// The role-specific fields of a [`User`] record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserVariant {
    Admin,
    Member { user_name: String },
    Pro { business_name: String },
}

/// `{id, role, variant}`, a full user record as returned by `get_user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    pub variant: UserVariant,
}

/// A direct message. `sender_id = 0` is an administrator-originated
/// message. The `*_age` fields are whole seconds since the corresponding
/// event; `0` means "not applicable" (e.g. `deleted_age = 0` means the
/// message hasn't been deleted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i32,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub read_age: i32,
    pub edited_age: i32,
    pub deleted_age: i32,
    pub sender_id: UserId,
    pub recipient_id: UserId,
}

/// A single page of messages, with the flag telling the caller whether
/// more rows exist past this window.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_next_page: bool,
}

/// Per-IP sliding-window rate-limit state, kept by the turnstile.
#[derive(Debug, Clone, Copy)]
pub struct TurnstileEntry {
    pub last_request_at: DateTime<Utc>,
    pub count_m: i32,
    pub count_h: i32,
}
