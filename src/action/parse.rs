//! JSON → [`Action`] decoding: strict typing, one decoder function per
//! argument kind, and the `"<verb>.with.<arg>"` error-location contract
//! of §4.1 and §9's "macro-generated argument parsers" re-architecture
//! note.

use serde_json::{Map, Value};

use super::{location, Action, ActionError};
use crate::dal::Dal;
use crate::error::Outcome;
use crate::model::{Constr, UserId, CONSTR_SEPARATOR, EMAIL_LENGTH, PSEUDO_LENGTH};

/// Splits a top-level JSON value into its constituent action values, per
/// §6's wire-format rules. A non-object, non-array value yields a
/// single `type_mismatch` located at `"request"`.
pub fn split_request(value: &Value) -> Result<Vec<&Value>, ActionError> {
    match value {
        Value::Object(_) => Ok(vec![value]),
        Value::Array(items) => Ok(items.iter().collect()),
        _ => Err(ActionError::type_mismatch("request")),
    }
}

/// Parses one action value into an [`Action`], resolving `user`/`dest`
/// references through the DAL when given as an email or a name — the
/// one place, per §2, where parsing touches the store.
pub async fn parse_action(value: &Value, dal: &dyn Dal) -> Action {
    let Some(obj) = value.as_object() else {
        return Action::Error(ActionError::type_mismatch("request"));
    };

    let verb = match obj.get("do") {
        None => return Action::Error(ActionError::missing_key("action.do")),
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return Action::Error(ActionError::type_mismatch("action.do")),
    };

    let with = match obj.get("with") {
        None => return Action::Error(ActionError::missing_key("action.with")),
        Some(Value::Object(m)) => m,
        Some(_) => return Action::Error(ActionError::type_mismatch("action.with")),
    };

    match parse_verb(verb, with, dal).await {
        Ok(action) => action,
        Err(e) => Action::Error(e),
    }
}

async fn parse_verb(verb: &str, with: &Map<String, Value>, dal: &dyn Dal) -> Result<Action, ActionError> {
    let constr = read_constr(with, verb)?;
    match verb {
        "whois" => {
            let user = read_user(with, "user", verb, dal).await?;
            Ok(Action::Whois { constr, user })
        }
        "send" => {
            let dest = read_user(with, "user", verb, dal).await?;
            let content = read_str(with, "content", verb)?.to_string();
            Ok(Action::Send { constr, dest, content })
        }
        "motd" => Ok(Action::Motd { constr }),
        "inbox" => {
            let page = read_page(with, verb)?;
            Ok(Action::Inbox { constr, page })
        }
        "outbox" => {
            let page = read_page(with, verb)?;
            Ok(Action::Outbox { constr, page })
        }
        "edit" => {
            let msg_id = read_i32(with, "msg_id", verb)?;
            let new_content = read_str(with, "new_content", verb)?.to_string();
            Ok(Action::Edit { constr, msg_id, new_content })
        }
        "rm" => {
            let msg_id = read_i32(with, "msg_id", verb)?;
            Ok(Action::Rm { constr, msg_id })
        }
        "block" => {
            let user = read_user(with, "user", verb, dal).await?;
            Ok(Action::Block { constr, user })
        }
        "unblock" => {
            let user = read_user(with, "user", verb, dal).await?;
            Ok(Action::Unblock { constr, user })
        }
        "ban" => {
            let user = read_user(with, "user", verb, dal).await?;
            Ok(Action::Ban { constr, user })
        }
        "unban" => {
            let user = read_user(with, "user", verb, dal).await?;
            Ok(Action::Unban { constr, user })
        }
        _ => {
            tracing::error!(verb, "unknown action verb");
            Err(ActionError::other("action.do", 500))
        }
    }
}

fn read_str<'a>(with: &'a Map<String, Value>, key: &str, verb: &str) -> Result<&'a str, ActionError> {
    match with.get(key) {
        None => Err(ActionError::missing_key(location(verb, key))),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ActionError::type_mismatch(location(verb, key))),
    }
}

fn read_i64(with: &Map<String, Value>, key: &str, verb: &str) -> Result<i64, ActionError> {
    match with.get(key) {
        None => Err(ActionError::missing_key(location(verb, key))),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| ActionError::type_mismatch(location(verb, key))),
        Some(_) => Err(ActionError::type_mismatch(location(verb, key))),
    }
}

fn read_i32(with: &Map<String, Value>, key: &str, verb: &str) -> Result<i32, ActionError> {
    let v = read_i64(with, key, verb)?;
    i32::try_from(v).map_err(|_| ActionError::type_mismatch(location(verb, key)))
}

fn read_page(with: &Map<String, Value>, verb: &str) -> Result<i64, ActionError> {
    match with.get("page") {
        None => Ok(1),
        Some(Value::Number(n)) => {
            let page = n.as_i64().ok_or_else(|| ActionError::type_mismatch(location(verb, "page")))?;
            if page < 1 {
                Err(ActionError::invalid_value(location(verb, "page")))
            } else {
                Ok(page)
            }
        }
        Some(_) => Err(ActionError::type_mismatch(location(verb, "page"))),
    }
}

fn read_constr(with: &Map<String, Value>, verb: &str) -> Result<Constr, ActionError> {
    let raw = read_str(with, "constr", verb)?;
    parse_constr(raw).ok_or_else(|| ActionError::invalid_value(location(verb, "constr")))
}

/// Parses the wire credential: a 36-char UUID, optionally followed by
/// the `¤` separator and a password.
fn parse_constr(raw: &str) -> Option<Constr> {
    if raw.len() < 36 {
        return None;
    }
    let (uuid_part, rest) = raw.split_at(36);
    let api_key = uuid::Uuid::parse_str(uuid_part).ok()?;
    let mut separator = [0u8; 4];
    let separator = CONSTR_SEPARATOR.encode_utf8(&mut separator);
    let password = rest.strip_prefix(separator.as_str()).map(String::from);
    Some(Constr { api_key, password })
}

/// Resolves a `user` argument: a positive JSON integer is a direct id;
/// a string is looked up by email (if it contains `@`) or by name
/// (members first, then professionals) — the only DAL traffic parsing
/// performs.
async fn read_user(
    with: &Map<String, Value>,
    key: &str,
    verb: &str,
    dal: &dyn Dal,
) -> Result<UserId, ActionError> {
    let loc = location(verb, key);
    match with.get(key) {
        None => Err(ActionError::missing_key(loc)),
        Some(Value::Number(n)) => {
            let id = n.as_i64().ok_or_else(|| ActionError::type_mismatch(loc.clone()))?;
            if id > 0 {
                i32::try_from(id).map_err(|_| ActionError::invalid_value(loc))
            } else {
                Err(ActionError::invalid_value(loc))
            }
        }
        Some(Value::String(s)) => {
            if s.len() > EMAIL_LENGTH.max(PSEUDO_LENGTH) {
                return Err(ActionError::invalid_value(loc));
            }
            let outcome = if s.contains('@') {
                dal.get_user_id_by_email(s).await
            } else {
                dal.get_user_id_by_name(s).await
            };
            match outcome {
                Outcome::Ok(id) => Ok(id),
                Outcome::NotFound => Err(ActionError::other(loc, 404)),
                Outcome::Internal => Err(ActionError::other(loc, 500)),
            }
        }
        Some(_) => Err(ActionError::invalid_value(loc)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dal::mock::MockDal;

    #[test]
    fn parse_constr_without_password() {
        let uuid = uuid::Uuid::new_v4();
        let raw = uuid.to_string();
        let constr = parse_constr(&raw).unwrap();
        assert_eq!(constr.api_key, uuid);
        assert_eq!(constr.password, None);
    }

    #[test]
    fn parse_constr_with_password() {
        let uuid = uuid::Uuid::new_v4();
        let raw = format!("{uuid}\u{a4}hunter2");
        let constr = parse_constr(&raw).unwrap();
        assert_eq!(constr.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn parse_constr_rejects_invalid_uuid() {
        assert!(parse_constr("not-a-uuid-at-all-not-a-uuid-at-al").is_none());
    }

    #[tokio::test]
    async fn split_request_accepts_object_and_array() {
        let obj = serde_json::json!({"do": "motd", "with": {}});
        assert_eq!(split_request(&obj).unwrap().len(), 1);

        let arr = serde_json::json!([{"do": "motd", "with": {}}, {"do": "motd", "with": {}}]);
        assert_eq!(split_request(&arr).unwrap().len(), 2);

        let bad = serde_json::json!("nope");
        assert!(split_request(&bad).is_err());
    }

    #[tokio::test]
    async fn unknown_verb_is_an_internal_error() {
        let dal = MockDal::new();
        let uuid = uuid::Uuid::new_v4();
        let value = serde_json::json!({"do": "frobnicate", "with": {"constr": uuid.to_string()}});
        match parse_action(&value, &dal).await {
            Action::Error(e) => assert_eq!(e.kind.status(), 500),
            _ => panic!("expected an error action"),
        }
    }

    #[tokio::test]
    async fn missing_with_is_a_missing_key_error() {
        let dal = MockDal::new();
        let value = serde_json::json!({"do": "motd"});
        match parse_action(&value, &dal).await {
            Action::Error(e) => assert_eq!(e.location, "action.with"),
            _ => panic!("expected an error action"),
        }
    }
}
