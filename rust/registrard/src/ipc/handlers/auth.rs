use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::helpers::{param_str, require_db, respond};
use crate::ipc::types::{AppState, Request};
use crate::schema::hash_secret;
use crate::session::{Role, Session};
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

struct Candidate {
    id: i64,
    full_name: String,
    role: String,
    password_hash: Option<String>,
}

fn login(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let full_name = param_str(params, "fullName")?;
    let password = params
        .get("password")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing password"))?;

    // Names are compared case-insensitively for any script, so filter in Rust.
    let wanted = full_name.to_lowercase();
    let mut stmt = conn
        .prepare("SELECT id, full_name, role, password_hash FROM users ORDER BY id")
        .map_err(|e| db_err("db_query_failed", "users", e))?;
    let candidate = stmt
        .query_map([], |r| {
            Ok(Candidate {
                id: r.get(0)?,
                full_name: r.get(1)?,
                role: r.get(2)?,
                password_hash: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "users", e))?
        .into_iter()
        .find(|c| c.full_name.trim().to_lowercase() == wanted);
    let Some(user) = candidate else {
        return Err(HandlerErr::not_found("user"));
    };

    let matches = user
        .password_hash
        .as_deref()
        .is_some_and(|stored| stored.eq_ignore_ascii_case(&hash_secret(password)));
    if !matches {
        return Err(HandlerErr::new("unauthorized", "wrong password"));
    }
    let Some(role) = Role::parse(&user.role) else {
        return Err(HandlerErr::new(
            "unauthorized",
            format!("user has an unrecognized role: {}", user.role),
        ));
    };

    let session = Session {
        user_id: user.id,
        role,
    };
    info!(user_id = user.id, role = role.as_str(), "signed in");
    Ok(json!({
        "session": session,
        "fullName": user.full_name,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(respond(
            req,
            require_db(state).and_then(|conn| login(conn, &req.params)),
        )),
        _ => None,
    }
}
