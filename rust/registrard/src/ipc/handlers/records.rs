//! Generic list/get/create/update/delete over the statically declared entities.

use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::helpers::{
    normalize_clock_time, param_i64, param_object, require_db, require_session, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::schema::{self, Entity, FieldKind};
use crate::session::{Role, Session};
use chrono::Datelike;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};

pub type Columns = Vec<(&'static str, Option<SqlValue>)>;

fn set_column(values: &mut Columns, column: &'static str, v: Option<SqlValue>) {
    match values.iter_mut().find(|(c, _)| *c == column) {
        Some(slot) => slot.1 = v,
        None => values.push((column, v)),
    }
}

fn text_column<'a>(values: &'a Columns, column: &str) -> Option<&'a str> {
    values.iter().find(|(c, _)| *c == column).and_then(|(_, v)| match v {
        Some(SqlValue::Text(s)) => Some(s.as_str()),
        _ => None,
    })
}

/// Per-entity rules layered over plain field normalization.
pub fn apply_entity_rules(
    entity: &Entity,
    values: &mut Columns,
    for_create: bool,
) -> Result<(), HandlerErr> {
    match entity.name {
        "users" => {
            if let Some(raw) = text_column(values, "role") {
                let Some(role) = Role::parse(raw) else {
                    return Err(HandlerErr::bad_params(
                        "role must be one of: student, teacher, admin",
                    ));
                };
                set_column(values, "role", Some(SqlValue::Text(role.as_str().to_string())));
            }
            if for_create && !values.iter().any(|(c, v)| *c == "start_year" && v.is_some()) {
                let year = chrono::Utc::now().year();
                set_column(values, "start_year", Some(SqlValue::Integer(i64::from(year))));
            }
        }
        "schedule" => {
            for column in ["start_time", "end_time"] {
                if let Some(raw) = text_column(values, column) {
                    let Some(t) = normalize_clock_time(raw) else {
                        return Err(HandlerErr::bad_params(format!(
                            "{} must be HH:MM or HH:MM:SS",
                            column
                        )));
                    };
                    set_column(values, column, Some(SqlValue::Text(t)));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

pub fn insert_record(conn: &Connection, entity: &Entity, values: &Columns) -> Result<i64, HandlerErr> {
    if values.is_empty() {
        return Err(HandlerErr::bad_params("record has no fields"));
    }
    let cols: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
    let placeholders = std::iter::repeat("?")
        .take(cols.len())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {}({}) VALUES({})",
        entity.table,
        cols.join(", "),
        placeholders
    );
    let binds = values
        .iter()
        .map(|(_, v)| v.clone().unwrap_or(SqlValue::Null));
    conn.execute(&sql, params_from_iter(binds))
        .map_err(|e| db_err("db_insert_failed", entity.table, e))?;
    Ok(conn.last_insert_rowid())
}

pub fn update_record(
    conn: &Connection,
    entity: &Entity,
    id: i64,
    values: &Columns,
) -> Result<(), HandlerErr> {
    if values.is_empty() {
        return Err(HandlerErr::bad_params("nothing to update"));
    }
    let sets = values
        .iter()
        .map(|(c, _)| format!("{} = ?", c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE {} SET {} WHERE id = ?", entity.table, sets);
    let mut binds: Vec<SqlValue> = values
        .iter()
        .map(|(_, v)| v.clone().unwrap_or(SqlValue::Null))
        .collect();
    binds.push(SqlValue::Integer(id));
    let changed = conn
        .execute(&sql, params_from_iter(binds))
        .map_err(|e| db_err("db_update_failed", entity.table, e))?;
    if changed == 0 {
        return Err(HandlerErr::not_found(entity.label));
    }
    Ok(())
}

/// Student sessions only see rows they own on entities that have an owner.
fn owner_scope(entity: &Entity, session: &Session) -> Option<(&'static str, i64)> {
    match entity.owner_column {
        Some(col) if session.role.is_student() => Some((col, session.user_id)),
        _ => None,
    }
}

pub fn fetch_record(
    conn: &Connection,
    entity: &Entity,
    id: i64,
    session: &Session,
) -> Result<Option<Value>, HandlerErr> {
    let mut sql = format!(
        "SELECT {} FROM {} WHERE id = ?",
        entity.select_list(),
        entity.table
    );
    let mut binds = vec![SqlValue::Integer(id)];
    if let Some((col, owner)) = owner_scope(entity, session) {
        sql.push_str(&format!(" AND {} = ?", col));
        binds.push(SqlValue::Integer(owner));
    }
    conn.query_row(&sql, params_from_iter(binds), |r| schema::row_to_json(entity, r))
        .optional()
        .map_err(|e| db_err("db_query_failed", entity.table, e))
}

fn list(conn: &Connection, entity: &Entity, session: &Session, params: &Value) -> Result<Value, HandlerErr> {
    let mut clauses: Vec<String> = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();

    match params.get("filters") {
        None | Some(Value::Null) => {}
        Some(Value::Object(filters)) => {
            for (k, v) in filters {
                let Some(f) = entity
                    .field_by_json(k)
                    .filter(|f| f.kind != FieldKind::Secret)
                else {
                    return Err(HandlerErr::bad_params(format!("unknown filter: {}", k)));
                };
                match schema::normalize(f, v) {
                    Ok(Some(sv)) => {
                        clauses.push(format!("{} = ?", f.column));
                        binds.push(sv);
                    }
                    Ok(None) => clauses.push(format!("{} IS NULL", f.column)),
                    Err(e) => return Err(HandlerErr::bad_params(e.to_string())),
                }
            }
        }
        Some(_) => return Err(HandlerErr::bad_params("filters must be an object")),
    }
    if let Some((col, owner)) = owner_scope(entity, session) {
        clauses.push(format!("{} = ?", col));
        binds.push(SqlValue::Integer(owner));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY id",
        entity.select_list(),
        entity.table,
        where_sql
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err("db_query_failed", entity.table, e))?;
    let rows = stmt
        .query_map(params_from_iter(binds), |r| schema::row_to_json(entity, r))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", entity.table, e))?;
    Ok(json!({ "rows": rows }))
}

fn get(conn: &Connection, entity: &Entity, session: &Session, params: &Value) -> Result<Value, HandlerErr> {
    let id = param_i64(params, "id")?;
    let row = fetch_record(conn, entity, id, session)?.ok_or_else(|| HandlerErr::not_found(entity.label))?;
    Ok(json!({ "row": row }))
}

fn create(conn: &Connection, entity: &'static Entity, params: &Value) -> Result<Value, HandlerErr> {
    let record = param_object(params, "record")?;
    let mut values = schema::normalize_record(entity, record, true)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    apply_entity_rules(entity, &mut values, true)?;
    let id = insert_record(conn, entity, &values)?;
    Ok(json!({ "id": id }))
}

fn update(conn: &Connection, entity: &'static Entity, params: &Value) -> Result<Value, HandlerErr> {
    let id = param_i64(params, "id")?;
    let patch = param_object(params, "patch")?;
    let mut values = schema::normalize_record(entity, patch, false)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    apply_entity_rules(entity, &mut values, false)?;
    update_record(conn, entity, id, &values)?;
    Ok(json!({ "id": id }))
}

pub fn delete_by_id(conn: &Connection, table: &str, label: &str, id: i64) -> Result<(), HandlerErr> {
    let sql = format!("DELETE FROM {} WHERE id = ?", table);
    let removed = conn
        .execute(&sql, [id])
        .map_err(|e| db_err("db_delete_failed", table, e))?;
    if removed == 0 {
        return Err(HandlerErr::not_found(label));
    }
    Ok(())
}

fn delete(conn: &Connection, entity: &Entity, params: &Value) -> Result<Value, HandlerErr> {
    let id = param_i64(params, "id")?;
    delete_by_id(conn, entity.table, entity.label, id)?;
    Ok(json!({ "id": id }))
}

fn handle(state: &mut AppState, req: &Request, entity: &'static Entity, op: &str) -> Result<Value, HandlerErr> {
    let access = match op {
        "list" | "get" => entity.read,
        _ => entity.write,
    };
    let session = require_session(req, access)?;
    let conn = require_db(state)?;
    match op {
        "list" => list(conn, entity, &session, &req.params),
        "get" => get(conn, entity, &session, &req.params),
        "create" => create(conn, entity, &req.params),
        "update" => update(conn, entity, &req.params),
        _ => delete(conn, entity, &req.params),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let (prefix, op) = req.method.rsplit_once('.')?;
    if !matches!(op, "list" | "get" | "create" | "update" | "delete") {
        return None;
    }
    let entity = schema::entity_by_name(prefix)?;
    Some(respond(req, handle(state, req, entity, op)))
}
