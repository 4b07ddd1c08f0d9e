use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::handlers::records::{insert_record, update_record, Columns};
use crate::ipc::helpers::{
    ensure_may_view_student, param_i64, param_object, require_db, require_session, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::schema::{self, ENROLLMENTS};
use crate::session::Access;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

fn column_i64(values: &Columns, column: &str) -> Option<i64> {
    values.iter().find(|(c, _)| *c == column).and_then(|(_, v)| match v {
        Some(SqlValue::Integer(i)) => Some(*i),
        _ => None,
    })
}

fn ensure_not_enrolled(
    conn: &Connection,
    student_id: i64,
    section_id: i64,
    except_id: Option<i64>,
) -> Result<(), HandlerErr> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM enrollments
             WHERE student_id = ? AND section_id = ? AND id != ?",
            (student_id, section_id, except_id.unwrap_or(-1)),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| db_err("db_query_failed", "enrollments", e))?;
    match existing {
        Some(id) => Err(HandlerErr::new(
            "conflict",
            "student already enrolled in this section",
        )
        .with_details(json!({ "id": id }))),
        None => Ok(()),
    }
}

fn enrollments_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let record = param_object(params, "record")?;
    let mut values = schema::normalize_record(&ENROLLMENTS, record, true)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let (Some(student_id), Some(section_id)) = (
        column_i64(&values, "student_id"),
        column_i64(&values, "section_id"),
    ) else {
        return Err(HandlerErr::bad_params("studentId and sectionId are required"));
    };
    ensure_not_enrolled(conn, student_id, section_id, None)?;

    let dated = values
        .iter()
        .any(|(c, v)| *c == "enrollment_date" && v.is_some());
    if !dated {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        values.retain(|(c, _)| *c != "enrollment_date");
        values.push(("enrollment_date", Some(SqlValue::Text(today))));
    }
    let id = insert_record(conn, &ENROLLMENTS, &values)?;
    Ok(json!({ "id": id }))
}

fn enrollments_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = param_i64(params, "id")?;
    let patch = param_object(params, "patch")?;
    let values = schema::normalize_record(&ENROLLMENTS, patch, false)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;

    let current: Option<(i64, i64)> = conn
        .query_row(
            "SELECT student_id, section_id FROM enrollments WHERE id = ?",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| db_err("db_query_failed", "enrollments", e))?;
    let Some((cur_student, cur_section)) = current else {
        return Err(HandlerErr::not_found(ENROLLMENTS.label));
    };
    let student_id = column_i64(&values, "student_id").unwrap_or(cur_student);
    let section_id = column_i64(&values, "section_id").unwrap_or(cur_section);
    ensure_not_enrolled(conn, student_id, section_id, Some(id))?;

    update_record(conn, &ENROLLMENTS, id, &values)?;
    Ok(json!({ "id": id }))
}

fn enrollments_for_student(conn: &Connection, student_id: i64) -> Result<Value, HandlerErr> {
    let sql = format!(
        "SELECT {}, s.label, c.id, c.code, c.name, c.credits
         FROM enrollments e
         JOIN sections s ON s.id = e.section_id
         JOIN courses c ON c.id = s.course_id
         WHERE e.student_id = ?
         ORDER BY c.code, c.name, e.id",
        ENROLLMENTS.select_list_as("e")
    );
    let extra = ENROLLMENTS.readable_fields().count() + 1;
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err("db_query_failed", "enrollments", e))?;
    let rows = stmt
        .query_map([student_id], |r| {
            let mut row = schema::row_to_json(&ENROLLMENTS, r)?;
            row["sectionLabel"] = json!(r.get::<_, Option<String>>(extra)?);
            row["courseId"] = json!(r.get::<_, i64>(extra + 1)?);
            row["courseCode"] = json!(r.get::<_, Option<String>>(extra + 2)?);
            row["courseName"] = json!(r.get::<_, String>(extra + 3)?);
            row["credits"] = json!(r.get::<_, Option<f64>>(extra + 4)?);
            Ok(row)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "enrollments", e))?;
    Ok(json!({ "studentId": student_id, "rows": rows }))
}

fn handle(state: &mut AppState, req: &Request, op: &str) -> Result<Value, HandlerErr> {
    let access = if op == "forStudent" { Access::Member } else { Access::Staff };
    let session = require_session(req, access)?;
    let conn = require_db(state)?;
    match op {
        "create" => enrollments_create(conn, &req.params),
        "update" => enrollments_update(conn, &req.params),
        _ => {
            let student_id = param_i64(&req.params, "studentId")?;
            ensure_may_view_student(&session, student_id)?;
            enrollments_for_student(conn, student_id)
        }
    }
}

/// Enrollment methods with duplicate checks; list/get/delete stay generic.
pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = req.method.strip_prefix("enrollments.")?;
    match op {
        "create" | "update" | "forStudent" => Some(respond(req, handle(state, req, op))),
        _ => None,
    }
}
