//! [`Response`] → JSON, per §4.4. A response object carries up to three
//! keys: `body`, `error`, and (only when set) `has_next_page`.

use serde_json::{json, Map, Value};

use super::ActionError;
use crate::model::{Message, MessagePage, User, UserVariant};

#[derive(Debug, Clone)]
pub enum Response {
    Whois(User),
    Send { msg_id: i32 },
    Motd { message: String },
    Page(MessagePage),
    Empty,
    Error(ActionError),
}

pub fn encode(response: &Response) -> Value {
    let mut obj = Map::new();
    match response {
        Response::Error(e) => {
            obj.insert("error".into(), encode_error(e));
        }
        Response::Whois(user) => {
            obj.insert("body".into(), encode_whois(user));
        }
        Response::Send { msg_id } => {
            obj.insert("body".into(), json!({ "msg_id": msg_id }));
        }
        Response::Motd { message } => {
            obj.insert("body".into(), json!({ "message": message }));
        }
        Response::Page(page) => {
            obj.insert(
                "body".into(),
                Value::Array(page.messages.iter().map(encode_message).collect()),
            );
            if page.has_next_page {
                obj.insert("has_next_page".into(), json!(true));
            }
        }
        Response::Empty => {
            obj.insert("body".into(), json!({}));
        }
    }
    Value::Object(obj)
}

/// The intended `{user_id, <role_key>: {...}}` shape — see §9's note
/// that the reference implementation nests the role object under
/// itself by mistake.
fn encode_whois(user: &User) -> Value {
    let role_key = user.role.key();
    let role_body = match &user.variant {
        UserVariant::Admin => json!({}),
        UserVariant::Member { user_name } => json!({ "user_name": user_name }),
        UserVariant::Pro { business_name } => json!({ "business_name": business_name }),
    };
    json!({ "user_id": user.id, role_key: role_body })
}

fn encode_message(msg: &Message) -> Value {
    let mut obj = Map::new();
    obj.insert("msg_id".into(), json!(msg.id));
    obj.insert("sent_at".into(), json!(msg.sent_at.to_rfc3339()));
    obj.insert("content".into(), json!(msg.content));
    obj.insert("sender".into(), json!(msg.sender_id));
    obj.insert("recipient".into(), json!(msg.recipient_id));
    if msg.deleted_age != 0 {
        obj.insert("deleted_age".into(), json!(msg.deleted_age));
    }
    if msg.read_age != 0 {
        obj.insert("read_age".into(), json!(msg.read_age));
    }
    if msg.edited_age != 0 {
        obj.insert("edited_age".into(), json!(msg.edited_age));
    }
    Value::Object(obj)
}

fn encode_error(e: &ActionError) -> Value {
    let mut obj = Map::new();
    obj.insert("status".into(), json!(e.kind.status()));
    obj.insert("message".into(), json!(render_message(e)));
    if let super::ActionErrorKind::RateLimit { next_request_at } = &e.kind {
        obj.insert("next_request_at".into(), json!(next_request_at.timestamp()));
    }
    Value::Object(obj)
}

fn render_message(e: &ActionError) -> String {
    match &e.kind {
        super::ActionErrorKind::MissingKey => format!("{}: missing required key", e.location),
        super::ActionErrorKind::TypeMismatch => format!("{}: wrong type", e.location),
        super::ActionErrorKind::InvalidValue => format!("{}: invalid value", e.location),
        super::ActionErrorKind::RateLimit { .. } => "too many requests".to_string(),
        super::ActionErrorKind::InvariantViolation { name } => format!("{}: {name}", e.location),
        super::ActionErrorKind::Other { status } => format!("{}: status {status}", e.location),
    }
}
