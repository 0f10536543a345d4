//! The real [`Dal`] implementation, backed by `sqlx::PgPool`.
//!
//! Queries are written with `sqlx::query`/`sqlx::query_as` against
//! `#[derive(sqlx::FromRow)]` structs rather than the compile-time
//! checked `query_as!` macro that `control::repo::*` uses, since this
//! repository is built and reviewed without a live database to run
//! `cargo sqlx prepare` against. The `ntohl`/timestamp byte-order contract
//! of §4.3 is absorbed by `sqlx`'s native Postgres binary protocol
//! support — no manual byte-order code is written.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::Dal;
use crate::error::{log_db_err, Outcome};
use crate::model::{Constr, Message, MessagePage, User, UserId, UserIdentity, UserVariant, ROOT_USER_ID};
use crate::role::Role;

pub struct PgDal {
    pool: PgPool,
}

impl PgDal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .min_connections(1)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct UserAuthRow {
    role: i16,
    password_hash: Option<String>,
    user_id: i32,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    role: i16,
    user_id: i32,
    member_user_name: Option<String>,
    pro_business_name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct MsgRow {
    msg_id: i32,
    content: String,
    sent_at: DateTime<Utc>,
    read_age: Option<i32>,
    edited_age: Option<i32>,
    /// Absent from the inbox/outbox queries, which never surface a
    /// deleted message; defaults to `None` there and is only ever
    /// populated by `get_msg`'s direct `_msg` lookup.
    #[sqlx(default)]
    deleted_age: Option<i32>,
    user_id_sender: Option<i32>,
    user_id_recipient: i32,
}

fn role_or_internal(op: &str, raw: i16) -> Option<Role> {
    match Role::from_stored(raw) {
        Some(role) => Some(role),
        None => {
            tracing::error!(operation = op, raw_role = raw, "database: incorrect user role received");
            None
        }
    }
}

#[async_trait::async_trait]
impl Dal for PgDal {
    async fn verify_user_constr(&self, constr: &Constr) -> Outcome<UserIdentity> {
        // The root administrator's credential lives in configuration,
        // never in the store; callers check `cfg.verify_root_constr`
        // before reaching this DAL call for id 0.
        let row: Option<UserAuthRow> = match sqlx::query_as(
            "select role, password_hash, user_id from \"user\" where api_key = $1",
        )
        .bind(constr.api_key)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                log_db_err("verify_user_constr", e);
                return Outcome::Internal;
            }
        };

        let Some(row) = row else {
            return Outcome::NotFound;
        };

        let Some(role) = role_or_internal("verify_user_constr", row.role) else {
            return Outcome::Internal;
        };

        let matches = match (&constr.password, &row.password_hash) {
            (None, None) => true,
            (Some(pw), Some(hash)) => bcrypt::verify(pw, hash).unwrap_or(false),
            _ => false,
        };

        if matches {
            Outcome::Ok(UserIdentity { id: row.user_id, role })
        } else {
            Outcome::NotFound
        }
    }

    async fn get_user_id_by_email(&self, email: &str) -> Outcome<UserId> {
        match sqlx::query_scalar::<_, i32>("select user_id from \"user\" where email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(id)) => Outcome::Ok(id),
            Ok(None) => Outcome::NotFound,
            Err(e) => {
                log_db_err("get_user_id_by_email", e);
                Outcome::Internal
            }
        }
    }

    async fn get_user_id_by_name(&self, name: &str) -> Outcome<UserId> {
        // Members first, since their user_name is unique; fall back to
        // pro business_name, which the store asserts is unique too.
        match sqlx::query_scalar::<_, i32>("select user_id from member where user_name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(id)) => return Outcome::Ok(id),
            Ok(None) => {}
            Err(e) => {
                log_db_err("get_user_id_by_name(member)", e);
                return Outcome::Internal;
            }
        }

        match sqlx::query_scalar::<_, i32>("select user_id from pro where business_name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(id)) => Outcome::Ok(id),
            Ok(None) => Outcome::NotFound,
            Err(e) => {
                log_db_err("get_user_id_by_name(pro)", e);
                Outcome::Internal
            }
        }
    }

    async fn get_user(&self, id: UserId) -> Outcome<User> {
        if id == ROOT_USER_ID {
            return Outcome::Ok(User {
                id: ROOT_USER_ID,
                role: Role::ADMIN,
                variant: UserVariant::Admin,
            });
        }

        let row: Option<UserRow> = match sqlx::query_as(
            "select role, user_id, member_user_name, pro_business_name from \"user\" where user_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                log_db_err("get_user", e);
                return Outcome::Internal;
            }
        };

        let Some(row) = row else {
            return Outcome::NotFound;
        };

        let Some(role) = role_or_internal("get_user", row.role) else {
            return Outcome::Internal;
        };

        let variant = match role {
            Role::ADMIN => UserVariant::Admin,
            Role::MEMBER => match row.member_user_name {
                Some(user_name) => UserVariant::Member { user_name },
                None => return Outcome::Internal,
            },
            Role::PRO => match row.pro_business_name {
                Some(business_name) => UserVariant::Pro { business_name },
                None => return Outcome::Internal,
            },
            _ => return Outcome::Internal,
        };

        Outcome::Ok(User { id: row.user_id, role, variant })
    }

    async fn get_user_role(&self, id: UserId) -> Outcome<Role> {
        if id == ROOT_USER_ID {
            return Outcome::Ok(Role::ADMIN);
        }
        match sqlx::query_scalar::<_, i16>("select role from \"user\" where user_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(raw)) => match role_or_internal("get_user_role", raw) {
                Some(role) => Outcome::Ok(role),
                None => Outcome::Internal,
            },
            Ok(None) => Outcome::NotFound,
            Err(e) => {
                log_db_err("get_user_role", e);
                Outcome::Internal
            }
        }
    }

    async fn get_msg(&self, id: i32) -> Outcome<Message> {
        let row: Option<MsgRow> = match sqlx::query_as(
            "select msg_id, content, sent_at, read_age, edited_age, deleted_age, \
             user_id_sender, user_id_recipient from _msg where msg_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                log_db_err("get_msg", e);
                return Outcome::Internal;
            }
        };

        match row {
            Some(row) => Outcome::Ok(row_to_message(row)),
            None => Outcome::NotFound,
        }
    }

    async fn count_msg(&self, sender_id: UserId, recipient_id: UserId) -> Outcome<i64> {
        match sqlx::query_scalar(
            "select count(*) from _msg where coalesce(user_id_sender, 0) = $1 and user_id_recipient = $2",
        )
        .bind(sender_id)
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await
        {
            Ok(count) => Outcome::Ok(count),
            Err(e) => {
                log_db_err("count_msg", e);
                Outcome::Internal
            }
        }
    }

    async fn send_msg(&self, sender_id: UserId, recipient_id: UserId, content: &str) -> Outcome<i32> {
        match sqlx::query_scalar("select send_msg($1, $2, $3)")
            .bind(sender_id)
            .bind(recipient_id)
            .bind(content)
            .fetch_one(&self.pool)
            .await
        {
            Ok(id) => Outcome::Ok(id),
            Err(e) => {
                log_db_err("send_msg", e);
                Outcome::Internal
            }
        }
    }

    async fn transaction(&self, sender_id: UserId, recipient_id: UserId, content: &str) -> Outcome<i32> {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                log_db_err("transaction(begin)", e);
                return Outcome::Internal;
            }
        };

        let outcome = match sqlx::query_scalar("select send_msg($1, $2, $3)")
            .bind(sender_id)
            .bind(recipient_id)
            .bind(content)
            .fetch_one(&mut *tx)
            .await
        {
            Ok(id) => Outcome::Ok(id),
            Err(e) => {
                log_db_err("transaction(send_msg)", e);
                Outcome::Internal
            }
        };

        let end = if matches!(outcome, Outcome::Ok(_)) {
            tx.commit().await
        } else {
            tx.rollback().await
        };

        if let Err(e) = end {
            log_db_err("transaction(end)", e);
            return Outcome::Internal;
        }

        outcome
    }

    async fn get_inbox(&self, limit: i64, offset: i64, recipient_id: UserId) -> Outcome<MessagePage> {
        fetch_page(
            &self.pool,
            "select msg_id, content, sent_at, read_age, edited_age, user_id_sender \
             from inbox where user_id_recipient = $1 order by sent_at desc \
             limit $2 offset $3",
            recipient_id,
            limit,
            offset,
            "get_inbox",
        )
        .await
    }

    async fn get_outbox(&self, limit: i64, offset: i64, sender_id: UserId) -> Outcome<MessagePage> {
        fetch_page(
            &self.pool,
            "select msg_id, content, sent_at, read_age, edited_age, user_id_sender, user_id_recipient \
             from outbox where coalesce(user_id_sender, 0) = $1 order by sent_at desc \
             limit $2 offset $3",
            sender_id,
            limit,
            offset,
            "get_outbox",
        )
        .await
    }

    async fn rm_msg(&self, id: i32) -> Outcome<()> {
        match sqlx::query("delete from _msg where msg_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(result) if result.rows_affected() == 1 => Outcome::Ok(()),
            Ok(_) => Outcome::NotFound,
            Err(e) => {
                log_db_err("rm_msg", e);
                Outcome::Internal
            }
        }
    }

    async fn edit_msg(&self, id: i32, new_content: &str) -> Outcome<()> {
        match sqlx::query(
            "update _msg set content = $2, edited_age = 0 where msg_id = $1 and deleted_age is null",
        )
        .bind(id)
        .bind(new_content)
        .execute(&self.pool)
        .await
        {
            Ok(result) if result.rows_affected() == 1 => Outcome::Ok(()),
            Ok(_) => Outcome::NotFound,
            Err(e) => {
                log_db_err("edit_msg", e);
                Outcome::Internal
            }
        }
    }

    async fn block_user(&self, blocker_id: UserId, target_id: UserId, for_seconds: i64) -> Outcome<()> {
        run_unit(
            &self.pool,
            "insert into block (blocker_id, target_id, expires_at) \
             values ($1, $2, now() + make_interval(secs => $3)) \
             on conflict (blocker_id, target_id) do update set expires_at = excluded.expires_at",
            blocker_id,
            target_id,
            for_seconds,
            "block_user",
        )
        .await
    }

    async fn unblock_user(&self, blocker_id: UserId, target_id: UserId) -> Outcome<()> {
        match sqlx::query("delete from block where blocker_id = $1 and target_id = $2")
            .bind(blocker_id)
            .bind(target_id)
            .execute(&self.pool)
            .await
        {
            Ok(_) => Outcome::Ok(()),
            Err(e) => {
                log_db_err("unblock_user", e);
                Outcome::Internal
            }
        }
    }

    async fn ban_user(&self, target_id: UserId, for_seconds: i64) -> Outcome<()> {
        match sqlx::query(
            "insert into ban (target_id, expires_at) values ($1, now() + make_interval(secs => $2)) \
             on conflict (target_id) do update set expires_at = excluded.expires_at",
        )
        .bind(target_id)
        .bind(for_seconds)
        .execute(&self.pool)
        .await
        {
            Ok(_) => Outcome::Ok(()),
            Err(e) => {
                log_db_err("ban_user", e);
                Outcome::Internal
            }
        }
    }

    async fn unban_user(&self, target_id: UserId) -> Outcome<()> {
        match sqlx::query("delete from ban where target_id = $1")
            .bind(target_id)
            .execute(&self.pool)
            .await
        {
            Ok(_) => Outcome::Ok(()),
            Err(e) => {
                log_db_err("unban_user", e);
                Outcome::Internal
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_unit(
    pool: &PgPool,
    sql: &str,
    a: UserId,
    b: UserId,
    c: i64,
    op: &str,
) -> Outcome<()> {
    match sqlx::query(sql).bind(a).bind(b).bind(c).execute(pool).await {
        Ok(_) => Outcome::Ok(()),
        Err(e) => {
            log_db_err(op, e);
            Outcome::Internal
        }
    }
}

/// Fetches `limit + 1` rows and truncates, so `has_next_page` reflects
/// whether a row exists past the requested window — the fix to §9's
/// open question about the reference implementation's dropped signal.
async fn fetch_page(
    pool: &PgPool,
    sql: &str,
    user_id: UserId,
    limit: i64,
    offset: i64,
    op: &str,
) -> Outcome<MessagePage> {
    let rows: Vec<MsgRow> = match sqlx::query_as(sql)
        .bind(user_id)
        .bind(limit + 1)
        .bind(offset)
        .fetch_all(pool)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            log_db_err(op, e);
            return Outcome::Internal;
        }
    };

    let has_next_page = rows.len() as i64 > limit;
    let messages = rows
        .into_iter()
        .take(limit as usize)
        .map(row_to_message)
        .collect();

    Outcome::Ok(MessagePage { messages, has_next_page })
}

fn row_to_message(row: MsgRow) -> Message {
    Message {
        id: row.msg_id,
        content: row.content,
        sent_at: row.sent_at,
        read_age: row.read_age.unwrap_or(0),
        edited_age: row.edited_age.unwrap_or(0),
        deleted_age: row.deleted_age.unwrap_or(0),
        sender_id: row.user_id_sender.unwrap_or(ROOT_USER_ID),
        recipient_id: row.user_id_recipient,
    }
}
