use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::handlers::records::delete_by_id;
use crate::ipc::helpers::{opt_param_i64, param_i64, param_str, require_db, require_session, respond};
use crate::ipc::types::{AppState, Request};
use crate::session::{Access, Session};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

const SENT_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn messages_list(conn: &Connection, session: &Session) -> Result<Value, HandlerErr> {
    let (scope, binds) = if session.role.is_student() {
        ("WHERE m.sender_id = ?1 OR m.receiver_id = ?1", vec![session.user_id])
    } else {
        ("", Vec::new())
    };
    let sql = format!(
        "SELECT m.id, m.sender_id, su.full_name, m.receiver_id, ru.full_name,
                m.section_id, m.body, m.is_read, m.sent_at
         FROM messages m
         LEFT JOIN users su ON su.id = m.sender_id
         LEFT JOIN users ru ON ru.id = m.receiver_id
         {}
         ORDER BY m.sent_at DESC, m.id DESC",
        scope
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err("db_query_failed", "messages", e))?;
    let rows = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "senderId": r.get::<_, i64>(1)?,
                "senderName": r.get::<_, Option<String>>(2)?,
                "receiverId": r.get::<_, i64>(3)?,
                "receiverName": r.get::<_, Option<String>>(4)?,
                "sectionId": r.get::<_, Option<i64>>(5)?,
                "body": r.get::<_, String>(6)?,
                "isRead": r.get::<_, i64>(7)? != 0,
                "sentAt": r.get::<_, String>(8)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "messages", e))?;
    Ok(json!({ "rows": rows }))
}

fn messages_create(conn: &Connection, session: &Session, params: &Value) -> Result<Value, HandlerErr> {
    let receiver_id = param_i64(params, "receiverId")?;
    let body = param_str(params, "body")?;
    let section_id = opt_param_i64(params, "sectionId")?;
    let sent_at = chrono::Utc::now().format(SENT_AT_FORMAT).to_string();
    conn.execute(
        "INSERT INTO messages(sender_id, receiver_id, section_id, body, is_read, sent_at)
         VALUES(?, ?, ?, ?, 0, ?)",
        (session.user_id, receiver_id, section_id, &body, &sent_at),
    )
    .map_err(|e| db_err("db_insert_failed", "messages", e))?;
    Ok(json!({ "id": conn.last_insert_rowid(), "sentAt": sent_at }))
}

/// Returns (sender_id, receiver_id) or `not_found`.
fn message_parties(conn: &Connection, id: i64) -> Result<(i64, i64), HandlerErr> {
    conn.query_row(
        "SELECT sender_id, receiver_id FROM messages WHERE id = ?",
        [id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()
    .map_err(|e| db_err("db_query_failed", "messages", e))?
    .ok_or_else(|| HandlerErr::not_found("message"))
}

fn messages_mark_read(conn: &Connection, session: &Session, params: &Value) -> Result<Value, HandlerErr> {
    let id = param_i64(params, "id")?;
    let (_, receiver_id) = message_parties(conn, id)?;
    if receiver_id != session.user_id && !session.role.can_manage() {
        return Err(HandlerErr::new(
            "forbidden",
            "only the receiver may mark a message as read",
        ));
    }
    conn.execute("UPDATE messages SET is_read = 1 WHERE id = ?", [id])
        .map_err(|e| db_err("db_update_failed", "messages", e))?;
    Ok(json!({ "id": id, "isRead": true }))
}

fn messages_delete(conn: &Connection, session: &Session, params: &Value) -> Result<Value, HandlerErr> {
    let id = param_i64(params, "id")?;
    let (sender_id, _) = message_parties(conn, id)?;
    if sender_id != session.user_id && !session.role.can_manage() {
        return Err(HandlerErr::new(
            "forbidden",
            "only the sender may delete a message",
        ));
    }
    delete_by_id(conn, "messages", "message", id)?;
    Ok(json!({ "id": id }))
}

fn handle(state: &mut AppState, req: &Request, op: &str) -> Result<Value, HandlerErr> {
    let session = require_session(req, Access::Member)?;
    let conn = require_db(state)?;
    match op {
        "list" => messages_list(conn, &session),
        "create" => messages_create(conn, &session, &req.params),
        "markRead" => messages_mark_read(conn, &session, &req.params),
        _ => messages_delete(conn, &session, &req.params),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = req.method.strip_prefix("messages.")?;
    match op {
        "list" | "create" | "markRead" | "delete" => Some(respond(req, handle(state, req, op))),
        _ => None,
    }
}
