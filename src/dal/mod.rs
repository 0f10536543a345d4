//! Data Access Layer: the only component that touches the store.
//!
//! Expressed as an `async_trait` so the evaluator can be exercised
//! against an in-memory double in tests — grounded on
//! `control::services::builds_root::BuildsRootService`'s
//! `Arc<dyn Trait>` pattern.

pub mod pg;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;

use crate::error::Outcome;
use crate::model::{Message, MessagePage, User, UserId, UserIdentity};
use crate::model::Constr;

/// The DAL contract of §4.3, plus the supplemental outbox/edit/block/ban
/// operations §4.2 adds. Every method returns the three-way
/// [`Outcome`]: `Ok`, `NotFound`, or an already-logged `Internal`.
#[async_trait]
pub trait Dal: Send + Sync {
    async fn verify_user_constr(&self, constr: &Constr) -> Outcome<UserIdentity>;
    async fn get_user_id_by_email(&self, email: &str) -> Outcome<UserId>;
    async fn get_user_id_by_name(&self, name: &str) -> Outcome<UserId>;
    async fn get_user(&self, id: UserId) -> Outcome<User>;
    async fn get_user_role(&self, id: UserId) -> Outcome<crate::role::Role>;
    async fn get_msg(&self, id: i32) -> Outcome<Message>;
    async fn count_msg(&self, sender_id: UserId, recipient_id: UserId) -> Outcome<i64>;
    /// `Ok(0)` means the sender is blocked from messaging this
    /// recipient, per the DAL contract's "0 means blocked-by-policy".
    async fn send_msg(&self, sender_id: UserId, recipient_id: UserId, content: &str) -> Outcome<i32>;
    async fn get_inbox(&self, limit: i64, offset: i64, recipient_id: UserId) -> Outcome<MessagePage>;
    async fn get_outbox(&self, limit: i64, offset: i64, sender_id: UserId) -> Outcome<MessagePage>;
    async fn rm_msg(&self, id: i32) -> Outcome<()>;
    async fn edit_msg(&self, id: i32, new_content: &str) -> Outcome<()>;
    async fn block_user(&self, blocker_id: UserId, target_id: UserId, for_seconds: i64) -> Outcome<()>;
    async fn unblock_user(&self, blocker_id: UserId, target_id: UserId) -> Outcome<()>;
    async fn ban_user(&self, target_id: UserId, for_seconds: i64) -> Outcome<()>;
    async fn unban_user(&self, target_id: UserId) -> Outcome<()>;

    /// Runs the message insert under an explicit store transaction: `BEGIN`,
    /// then `COMMIT` if the insert resolves to [`Outcome::Ok`], or
    /// `ROLLBACK` otherwise. This is the one multi-step write invariant 3
    /// cares about ("no partial write may be visible on failure"); `send`
    /// goes through this rather than a bare pool query. Nested
    /// transactions are not supported.
    async fn transaction(&self, sender_id: UserId, recipient_id: UserId, content: &str) -> Outcome<i32>;
}
