//! Authenticate → authorise → enforce invariants → dispatch: the
//! evaluator described in §4.2, total over every verb in [`Action`].

use super::response::Response;
use super::{Action, ActionError};
use crate::config::Settings;
use crate::dal::Dal;
use crate::error::Outcome;
use crate::model::{UserId, UserIdentity};
use crate::role::Role;

pub async fn evaluate(action: Action, dal: &dyn Dal, cfg: &Settings) -> Response {
    match action {
        Action::Error(e) => Response::Error(e),
        Action::Whois { constr, user } => eval_whois(constr, user, dal, cfg).await,
        Action::Send { constr, dest, content } => eval_send(constr, dest, content, dal, cfg).await,
        Action::Motd { constr } => eval_motd(constr, dal, cfg).await,
        Action::Inbox { constr, page } => eval_inbox(constr, page, dal, cfg).await,
        Action::Outbox { constr, page } => eval_outbox(constr, page, dal, cfg).await,
        Action::Edit { constr, msg_id, new_content } => eval_edit(constr, msg_id, new_content, dal, cfg).await,
        Action::Rm { constr, msg_id } => eval_rm(constr, msg_id, dal, cfg).await,
        Action::Block { constr, user } => eval_block(constr, user, dal, cfg).await,
        Action::Unblock { constr, user } => eval_unblock(constr, user, dal, cfg).await,
        Action::Ban { constr, user } => eval_ban(constr, user, dal, cfg).await,
        Action::Unban { constr, user } => eval_unban(constr, user, dal, cfg).await,
    }
}

/// Authenticates a wire credential: the configured root short-circuit
/// first, then the DAL's user path. Per §4.3, root never goes through
/// the DAL.
async fn authenticate(constr: &crate::model::Constr, dal: &dyn Dal, cfg: &Settings) -> Result<UserIdentity, ActionError> {
    if cfg.root.verify(constr.api_key, constr.password.as_deref()) {
        return Ok(UserIdentity { id: crate::model::ROOT_USER_ID, role: Role::ADMIN });
    }
    match dal.verify_user_constr(constr).await {
        Outcome::Ok(identity) => Ok(identity),
        Outcome::NotFound => Err(ActionError::other("constr", 401)),
        Outcome::Internal => Err(ActionError::other("constr", 500)),
    }
}

fn authorize(caller: &UserIdentity, allowed: Role, verb: &str) -> Result<(), ActionError> {
    if caller.role.intersects(allowed) {
        Ok(())
    } else {
        Err(ActionError::other(verb, 403))
    }
}

async fn eval_whois(constr: crate::model::Constr, user: UserId, dal: &dyn Dal, cfg: &Settings) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ALL, "whois") {
        return Response::Error(e);
    }
    match dal.get_user(user).await {
        Outcome::Ok(u) => Response::Whois(u),
        Outcome::NotFound => Response::Error(ActionError::other("whois.with.user", 404)),
        Outcome::Internal => Response::Error(ActionError::other("whois", 500)),
    }
}

async fn eval_send(
    constr: crate::model::Constr,
    dest: UserId,
    content: String,
    dal: &dyn Dal,
    cfg: &Settings,
) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ALL, "send") {
        return Response::Error(e);
    }

    let dest_role = match dal.get_user_role(dest).await {
        Outcome::Ok(r) => r,
        Outcome::NotFound => return Response::Error(ActionError::other("send.with.user", 404)),
        Outcome::Internal => return Response::Error(ActionError::other("send", 500)),
    };

    if content.len() > cfg.max_msg_length {
        return Response::Error(ActionError::other("send.with.content", 413));
    }
    if caller.id == dest {
        return Response::Error(ActionError::invariant("send", "no_send_self"));
    }
    if caller.role == Role::MEMBER && dest_role != Role::PRO {
        return Response::Error(ActionError::invariant("send", "client_send_pro"));
    }
    if caller.role == Role::PRO {
        if dest_role != Role::MEMBER {
            return Response::Error(ActionError::invariant("send", "pro_responds_client"));
        }
        match dal.count_msg(dest, caller.id).await {
            Outcome::Ok(0) => return Response::Error(ActionError::invariant("send", "pro_responds_client")),
            Outcome::Ok(_) => {}
            Outcome::NotFound => {}
            Outcome::Internal => return Response::Error(ActionError::other("send", 500)),
        }
    }

    match dal.transaction(caller.id, dest, &content).await {
        Outcome::Ok(0) => Response::Error(ActionError::other("send", 403)),
        Outcome::Ok(id) => Response::Send { msg_id: id },
        Outcome::NotFound => Response::Error(ActionError::other("send", 500)),
        Outcome::Internal => Response::Error(ActionError::other("send", 500)),
    }
}

async fn eval_motd(constr: crate::model::Constr, dal: &dyn Dal, cfg: &Settings) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ALL, "motd") {
        return Response::Error(e);
    }
    Response::Motd { message: cfg.motd.clone() }
}

async fn eval_inbox(constr: crate::model::Constr, page: i64, dal: &dyn Dal, cfg: &Settings) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ALL, "inbox") {
        return Response::Error(e);
    }
    let limit = cfg.page_inbox;
    let offset = limit * (page - 1);
    match dal.get_inbox(limit, offset, caller.id).await {
        Outcome::Ok(page) => Response::Page(page),
        Outcome::NotFound => Response::Page(Default::default()),
        Outcome::Internal => Response::Error(ActionError::other("inbox", 500)),
    }
}

async fn eval_outbox(constr: crate::model::Constr, page: i64, dal: &dyn Dal, cfg: &Settings) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ALL, "outbox") {
        return Response::Error(e);
    }
    let limit = cfg.page_outbox;
    let offset = limit * (page - 1);
    match dal.get_outbox(limit, offset, caller.id).await {
        Outcome::Ok(page) => Response::Page(page),
        Outcome::NotFound => Response::Page(Default::default()),
        Outcome::Internal => Response::Error(ActionError::other("outbox", 500)),
    }
}

async fn eval_edit(
    constr: crate::model::Constr,
    msg_id: i32,
    new_content: String,
    dal: &dyn Dal,
    cfg: &Settings,
) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ALL, "edit") {
        return Response::Error(e);
    }
    if new_content.len() > cfg.max_msg_length {
        return Response::Error(ActionError::other("edit.with.new_content", 413));
    }
    match dal.edit_msg(msg_id, &new_content).await {
        Outcome::Ok(()) => Response::Empty,
        Outcome::NotFound => Response::Error(ActionError::other("edit.with.msg_id", 404)),
        Outcome::Internal => Response::Error(ActionError::other("edit", 500)),
    }
}

async fn eval_rm(constr: crate::model::Constr, msg_id: i32, dal: &dyn Dal, cfg: &Settings) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ALL, "rm") {
        return Response::Error(e);
    }
    match dal.rm_msg(msg_id).await {
        Outcome::Ok(()) => Response::Empty,
        Outcome::NotFound => Response::Error(ActionError::other("rm.with.msg_id", 404)),
        Outcome::Internal => Response::Error(ActionError::other("rm", 500)),
    }
}

async fn eval_block(constr: crate::model::Constr, user: UserId, dal: &dyn Dal, cfg: &Settings) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ADMIN_OR_PRO, "block") {
        return Response::Error(e);
    }
    match dal.block_user(caller.id, user, cfg.block_for).await {
        Outcome::Ok(()) => Response::Empty,
        Outcome::NotFound => Response::Error(ActionError::other("block.with.user", 404)),
        Outcome::Internal => Response::Error(ActionError::other("block", 500)),
    }
}

async fn eval_unblock(constr: crate::model::Constr, user: UserId, dal: &dyn Dal, cfg: &Settings) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ADMIN_OR_PRO, "unblock") {
        return Response::Error(e);
    }
    match dal.unblock_user(caller.id, user).await {
        Outcome::Ok(()) => Response::Empty,
        Outcome::NotFound => Response::Error(ActionError::other("unblock.with.user", 404)),
        Outcome::Internal => Response::Error(ActionError::other("unblock", 500)),
    }
}

async fn eval_ban(constr: crate::model::Constr, user: UserId, dal: &dyn Dal, cfg: &Settings) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ADMIN_OR_PRO, "ban") {
        return Response::Error(e);
    }
    match dal.ban_user(user, cfg.block_for).await {
        Outcome::Ok(()) => Response::Empty,
        Outcome::NotFound => Response::Error(ActionError::other("ban.with.user", 404)),
        Outcome::Internal => Response::Error(ActionError::other("ban", 500)),
    }
}

async fn eval_unban(constr: crate::model::Constr, user: UserId, dal: &dyn Dal, cfg: &Settings) -> Response {
    let caller = match authenticate(&constr, dal, cfg).await {
        Ok(c) => c,
        Err(e) => return Response::Error(e),
    };
    if let Err(e) = authorize(&caller, Role::ADMIN_OR_PRO, "unban") {
        return Response::Error(e);
    }
    match dal.unban_user(user).await {
        Outcome::Ok(()) => Response::Empty,
        Outcome::NotFound => Response::Error(ActionError::other("unban.with.user", 404)),
        Outcome::Internal => Response::Error(ActionError::other("unban", 500)),
    }
}
