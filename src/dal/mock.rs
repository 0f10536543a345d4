//! An in-memory [`Dal`] double for exercising the evaluator without a
//! database, grounded on `control::services::builds_root`'s pattern of
//! keeping a test-only implementation alongside the real one.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::Dal;
use crate::error::Outcome;
use crate::model::{Constr, Message, MessagePage, User, UserId, UserIdentity, UserVariant};
use crate::role::Role;

#[derive(Clone)]
struct StoredUser {
    identity: UserIdentity,
    variant: UserVariant,
    email: Option<String>,
    name: Option<String>,
    api_key: uuid::Uuid,
    password_hash: Option<String>,
}

#[derive(Default, Clone)]
struct State {
    users: Vec<StoredUser>,
    messages: Vec<Message>,
    next_msg_id: i32,
    blocks: HashMap<(UserId, UserId), i64>,
    bans: HashMap<UserId, i64>,
}

pub struct MockDal {
    state: Mutex<State>,
}

impl Default for MockDal {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                next_msg_id: 1,
                ..State::default()
            }),
        }
    }
}

impl MockDal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user record, returning its assigned id.
    pub fn seed_user(
        &self,
        id: UserId,
        role: Role,
        variant: UserVariant,
        email: Option<&str>,
        name: Option<&str>,
        api_key: uuid::Uuid,
        password: Option<&str>,
    ) {
        let password_hash = password.map(|pw| bcrypt::hash(pw, 4).unwrap());
        let mut state = self.state.lock().unwrap();
        state.users.push(StoredUser {
            identity: UserIdentity { id, role },
            variant,
            email: email.map(String::from),
            name: name.map(String::from),
            api_key,
            password_hash,
        });
    }

    pub fn is_blocked(&self, blocker_id: UserId, target_id: UserId) -> bool {
        self.state.lock().unwrap().blocks.contains_key(&(blocker_id, target_id))
    }

    pub fn is_banned(&self, target_id: UserId) -> bool {
        self.state.lock().unwrap().bans.contains_key(&target_id)
    }
}

#[async_trait]
impl Dal for MockDal {
    async fn verify_user_constr(&self, constr: &Constr) -> Outcome<UserIdentity> {
        let state = self.state.lock().unwrap();
        let Some(user) = state.users.iter().find(|u| u.api_key == constr.api_key) else {
            return Outcome::NotFound;
        };
        let matches = match (&constr.password, &user.password_hash) {
            (None, None) => true,
            (Some(pw), Some(hash)) => bcrypt::verify(pw, hash).unwrap_or(false),
            _ => false,
        };
        if matches {
            Outcome::Ok(user.identity)
        } else {
            Outcome::NotFound
        }
    }

    async fn get_user_id_by_email(&self, email: &str) -> Outcome<UserId> {
        let state = self.state.lock().unwrap();
        match state.users.iter().find(|u| u.email.as_deref() == Some(email)) {
            Some(u) => Outcome::Ok(u.identity.id),
            None => Outcome::NotFound,
        }
    }

    async fn get_user_id_by_name(&self, name: &str) -> Outcome<UserId> {
        let state = self.state.lock().unwrap();
        match state.users.iter().find(|u| u.name.as_deref() == Some(name)) {
            Some(u) => Outcome::Ok(u.identity.id),
            None => Outcome::NotFound,
        }
    }

    async fn get_user(&self, id: UserId) -> Outcome<User> {
        let state = self.state.lock().unwrap();
        match state.users.iter().find(|u| u.identity.id == id) {
            Some(u) => Outcome::Ok(User {
                id: u.identity.id,
                role: u.identity.role,
                variant: u.variant.clone(),
            }),
            None => Outcome::NotFound,
        }
    }

    async fn get_user_role(&self, id: UserId) -> Outcome<Role> {
        let state = self.state.lock().unwrap();
        match state.users.iter().find(|u| u.identity.id == id) {
            Some(u) => Outcome::Ok(u.identity.role),
            None => Outcome::NotFound,
        }
    }

    async fn get_msg(&self, id: i32) -> Outcome<Message> {
        let state = self.state.lock().unwrap();
        match state.messages.iter().find(|m| m.id == id) {
            Some(m) => Outcome::Ok(m.clone()),
            None => Outcome::NotFound,
        }
    }

    async fn count_msg(&self, sender_id: UserId, recipient_id: UserId) -> Outcome<i64> {
        let state = self.state.lock().unwrap();
        let count = state
            .messages
            .iter()
            .filter(|m| m.sender_id == sender_id && m.recipient_id == recipient_id)
            .count();
        Outcome::Ok(count as i64)
    }

    async fn send_msg(&self, sender_id: UserId, recipient_id: UserId, content: &str) -> Outcome<i32> {
        let mut state = self.state.lock().unwrap();
        if state.blocks.contains_key(&(recipient_id, sender_id)) || state.bans.contains_key(&sender_id) {
            return Outcome::Ok(0);
        }
        let id = state.next_msg_id;
        state.next_msg_id += 1;
        state.messages.push(Message {
            id,
            content: content.to_string(),
            sent_at: Utc::now(),
            read_age: 0,
            edited_age: 0,
            deleted_age: 0,
            sender_id,
            recipient_id,
        });
        Outcome::Ok(id)
    }

    /// The in-memory store has no real transaction log, so "rollback" is
    /// realised as a snapshot-and-restore around the single write — the
    /// observable contract (no partial write survives a non-`Ok` outcome)
    /// matches `PgDal`'s real `BEGIN`/`COMMIT`/`ROLLBACK` even though
    /// nothing here can actually be left half-written.
    async fn transaction(&self, sender_id: UserId, recipient_id: UserId, content: &str) -> Outcome<i32> {
        let snapshot = self.state.lock().unwrap().clone();
        let outcome = self.send_msg(sender_id, recipient_id, content).await;
        if !matches!(outcome, Outcome::Ok(_)) {
            *self.state.lock().unwrap() = snapshot;
        }
        outcome
    }

    async fn get_inbox(&self, limit: i64, offset: i64, recipient_id: UserId) -> Outcome<MessagePage> {
        let state = self.state.lock().unwrap();
        page(
            state
                .messages
                .iter()
                .filter(|m| m.recipient_id == recipient_id)
                .cloned(),
            limit,
            offset,
        )
    }

    async fn get_outbox(&self, limit: i64, offset: i64, sender_id: UserId) -> Outcome<MessagePage> {
        let state = self.state.lock().unwrap();
        page(
            state
                .messages
                .iter()
                .filter(|m| m.sender_id == sender_id)
                .cloned(),
            limit,
            offset,
        )
    }

    async fn rm_msg(&self, id: i32) -> Outcome<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.messages.len();
        state.messages.retain(|m| m.id != id);
        if state.messages.len() < before {
            Outcome::Ok(())
        } else {
            Outcome::NotFound
        }
    }

    async fn edit_msg(&self, id: i32, new_content: &str) -> Outcome<()> {
        let mut state = self.state.lock().unwrap();
        match state.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.content = new_content.to_string();
                Outcome::Ok(())
            }
            None => Outcome::NotFound,
        }
    }

    async fn block_user(&self, blocker_id: UserId, target_id: UserId, for_seconds: i64) -> Outcome<()> {
        self.state.lock().unwrap().blocks.insert((blocker_id, target_id), for_seconds);
        Outcome::Ok(())
    }

    async fn unblock_user(&self, blocker_id: UserId, target_id: UserId) -> Outcome<()> {
        self.state.lock().unwrap().blocks.remove(&(blocker_id, target_id));
        Outcome::Ok(())
    }

    async fn ban_user(&self, target_id: UserId, for_seconds: i64) -> Outcome<()> {
        self.state.lock().unwrap().bans.insert(target_id, for_seconds);
        Outcome::Ok(())
    }

    async fn unban_user(&self, target_id: UserId) -> Outcome<()> {
        self.state.lock().unwrap().bans.remove(&target_id);
        Outcome::Ok(())
    }
}

fn page(iter: impl Iterator<Item = Message>, limit: i64, offset: i64) -> Outcome<MessagePage> {
    let mut all: Vec<Message> = iter.collect();
    all.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
    let windowed: Vec<Message> = all
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize + 1)
        .collect();
    let has_next_page = windowed.len() as i64 > limit;
    let messages = windowed.into_iter().take(limit as usize).collect();
    Outcome::Ok(MessagePage { messages, has_next_page })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role) -> (Constr, MockDal) {
        let dal = MockDal::new();
        let api_key = uuid::Uuid::new_v4();
        dal.seed_user(
            1,
            role,
            UserVariant::Member { user_name: "alice".into() },
            Some("alice@example.com"),
            Some("alice"),
            api_key,
            Some("hunter2"),
        );
        (Constr { api_key, password: Some("hunter2".into()) }, dal)
    }

    #[tokio::test]
    async fn verify_user_constr_accepts_correct_password() {
        let (constr, dal) = identity(Role::MEMBER);
        match dal.verify_user_constr(&constr).await {
            Outcome::Ok(identity) => assert_eq!(identity.id, 1),
            _ => panic!("expected Ok"),
        }
    }

    #[tokio::test]
    async fn verify_user_constr_rejects_wrong_password() {
        let (mut constr, dal) = identity(Role::MEMBER);
        constr.password = Some("wrong".into());
        assert!(matches!(dal.verify_user_constr(&constr).await, Outcome::NotFound));
    }

    #[tokio::test]
    async fn send_msg_blocked_returns_zero() {
        let dal = MockDal::new();
        dal.block_user(2, 1, 86_400).await;
        assert!(matches!(dal.send_msg(1, 2, "hi").await, Outcome::Ok(0)));
    }

    #[tokio::test]
    async fn inbox_reports_has_next_page() {
        let dal = MockDal::new();
        for _ in 0..5 {
            dal.send_msg(2, 1, "hi").await;
        }
        match dal.get_inbox(3, 0, 1).await {
            Outcome::Ok(page) => {
                assert_eq!(page.messages.len(), 3);
                assert!(page.has_next_page);
            }
            _ => panic!("expected Ok"),
        }
    }
}
