use crate::calc::{self, GradeOutcome, LetterGrade};
use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::handlers::records::delete_by_id;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    ensure_may_view_student, opt_param_i64, param_i64, require_db, require_session, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::session::{Access, Session};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};
use tracing::warn;

const GRADE_COLUMNS: &str = "g.id, g.student_id, g.section_id, g.midterm, g.final, \
     g.final_weighted_score, g.letter_grade, g.status, g.grade_point";

fn grade_row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "studentId": r.get::<_, i64>(1)?,
        "sectionId": r.get::<_, i64>(2)?,
        "midterm": r.get::<_, Option<f64>>(3)?,
        "final": r.get::<_, Option<f64>>(4)?,
        "finalWeightedScore": r.get::<_, f64>(5)?,
        "letterGrade": r.get::<_, String>(6)?,
        "status": r.get::<_, String>(7)?,
        "gradePoint": r.get::<_, f64>(8)?,
    }))
}

fn outcome_json(outcome: &GradeOutcome) -> Value {
    json!({
        "finalWeightedScore": outcome.final_weighted_score,
        "letterGrade": outcome.letter_grade.as_str(),
        "status": outcome.status.as_str(),
        "gradePoint": outcome.grade_point,
    })
}

fn grades_preview(req: &Request) -> Result<Value, HandlerErr> {
    require_session(req, Access::Member)?;
    let midterm = calc::score_from_json(req.params.get("midterm"));
    let final_score = calc::score_from_json(req.params.get("final"));
    Ok(outcome_json(&calc::compute_grade(midterm, final_score)))
}

fn grades_list(conn: &Connection, session: &Session, params: &Value) -> Result<Value, HandlerErr> {
    let mut student_id = opt_param_i64(params, "studentId")?;
    let section_id = opt_param_i64(params, "sectionId")?;
    if session.role.is_student() {
        if let Some(id) = student_id {
            ensure_may_view_student(session, id)?;
        }
        student_id = Some(session.user_id);
    }

    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    if let Some(id) = student_id {
        clauses.push("g.student_id = ?");
        binds.push(SqlValue::Integer(id));
    }
    if let Some(id) = section_id {
        clauses.push("g.section_id = ?");
        binds.push(SqlValue::Integer(id));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM section_grades g{} ORDER BY g.id",
        GRADE_COLUMNS, where_sql
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err("db_query_failed", "section_grades", e))?;
    let rows = stmt
        .query_map(params_from_iter(binds), grade_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "section_grades", e))?;
    Ok(json!({ "rows": rows }))
}

fn grades_for_student(conn: &Connection, session: &Session, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = param_i64(params, "studentId")?;
    ensure_may_view_student(session, student_id)?;
    let sql = format!(
        "SELECT {}, c.id, c.code, c.name
         FROM section_grades g
         JOIN sections s ON s.id = g.section_id
         JOIN courses c ON c.id = s.course_id
         WHERE g.student_id = ?
         ORDER BY c.code, c.name, g.id",
        GRADE_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err("db_query_failed", "section_grades", e))?;
    let rows = stmt
        .query_map([student_id], |r| {
            let mut row = grade_row_json(r)?;
            row["courseId"] = json!(r.get::<_, i64>(9)?);
            row["courseCode"] = json!(r.get::<_, Option<String>>(10)?);
            row["courseName"] = json!(r.get::<_, String>(11)?);
            Ok(row)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "section_grades", e))?;
    Ok(json!({ "studentId": student_id, "rows": rows }))
}

fn grades_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = param_i64(params, "studentId")?;
    let section_id = param_i64(params, "sectionId")?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM section_grades WHERE student_id = ? AND section_id = ?",
            (student_id, section_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| db_err("db_query_failed", "section_grades", e))?;
    if let Some(existing_id) = existing {
        return Err(HandlerErr::new(
            "conflict",
            "grade already recorded for this student and section",
        )
        .with_details(json!({ "id": existing_id })));
    }

    let midterm = calc::score_from_json(params.get("midterm"));
    let final_score = calc::score_from_json(params.get("final"));
    let outcome = calc::compute_grade(midterm, final_score);
    conn.execute(
        "INSERT INTO section_grades(
            student_id, section_id, midterm, final,
            final_weighted_score, letter_grade, status, grade_point
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            student_id,
            section_id,
            midterm,
            final_score,
            outcome.final_weighted_score,
            outcome.letter_grade.as_str(),
            outcome.status.as_str(),
            outcome.grade_point,
        ),
    )
    .map_err(|e| db_err("db_insert_failed", "section_grades", e))?;
    let id = conn.last_insert_rowid();

    let mut out = outcome_json(&outcome);
    out["id"] = json!(id);
    Ok(out)
}

fn grades_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = param_i64(params, "id")?;
    let stored: Option<(Option<f64>, Option<f64>)> = conn
        .query_row(
            "SELECT midterm, final FROM section_grades WHERE id = ?",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| db_err("db_query_failed", "section_grades", e))?;
    let Some((stored_midterm, stored_final)) = stored else {
        return Err(HandlerErr::not_found("grade"));
    };

    let midterm = match params.get("midterm") {
        Some(raw) => calc::score_from_json(Some(raw)),
        None => stored_midterm,
    };
    let final_score = match params.get("final") {
        Some(raw) => calc::score_from_json(Some(raw)),
        None => stored_final,
    };
    let outcome = calc::compute_grade(midterm, final_score);
    conn.execute(
        "UPDATE section_grades
         SET midterm = ?, final = ?, final_weighted_score = ?,
             letter_grade = ?, status = ?, grade_point = ?
         WHERE id = ?",
        (
            midterm,
            final_score,
            outcome.final_weighted_score,
            outcome.letter_grade.as_str(),
            outcome.status.as_str(),
            outcome.grade_point,
            id,
        ),
    )
    .map_err(|e| db_err("db_update_failed", "section_grades", e))?;

    let mut out = outcome_json(&outcome);
    out["id"] = json!(id);
    Ok(out)
}

fn grades_gpa(conn: &Connection, session: &Session, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = param_i64(params, "studentId")?;
    ensure_may_view_student(session, student_id)?;
    let credit = setup::credit_weight(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;

    let mut stmt = conn
        .prepare("SELECT id, letter_grade FROM section_grades WHERE student_id = ? ORDER BY id")
        .map_err(|e| db_err("db_query_failed", "section_grades", e))?;
    let stored = stmt
        .query_map([student_id], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "section_grades", e))?;

    let records: Vec<(LetterGrade, f64)> = stored
        .into_iter()
        .map(|(id, raw)| {
            let letter = LetterGrade::parse(&raw).unwrap_or_else(|| {
                warn!(grade_id = id, letter = %raw, "unknown stored letter grade counted as FF");
                LetterGrade::FF
            });
            (letter, credit)
        })
        .collect();
    let total_credits: f64 = records.iter().map(|(_, c)| c).sum();
    Ok(json!({
        "studentId": student_id,
        "gpa": calc::compute_gpa(&records),
        "totalCredits": total_credits,
        "recordCount": records.len(),
    }))
}

fn handle(state: &mut AppState, req: &Request, op: &str) -> Result<Value, HandlerErr> {
    if op == "preview" {
        return grades_preview(req);
    }
    let access = match op {
        "list" | "forStudent" | "gpa" => Access::Member,
        _ => Access::Staff,
    };
    let session = require_session(req, access)?;
    let conn = require_db(state)?;
    match op {
        "list" => grades_list(conn, &session, &req.params),
        "forStudent" => grades_for_student(conn, &session, &req.params),
        "gpa" => grades_gpa(conn, &session, &req.params),
        "create" => grades_create(conn, &req.params),
        "update" => grades_update(conn, &req.params),
        _ => {
            let id = param_i64(&req.params, "id")?;
            delete_by_id(conn, "section_grades", "grade", id)?;
            Ok(json!({ "id": id }))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = req.method.strip_prefix("grades.")?;
    match op {
        "preview" | "list" | "forStudent" | "create" | "update" | "delete" | "gpa" => {
            Some(respond(req, handle(state, req, op)))
        }
        _ => None,
    }
}
