use crate::db::{self, SqlSectionStore};
use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::handlers::records::{apply_entity_rules, insert_record};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    ensure_may_view_student, opt_param_str, param_i64, require_db, require_session, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::resolve::{resolve_section, ResolutionError, SelectionToken};
use crate::schema::{self, SCHEDULE};
use crate::session::Access;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

struct CourseRow {
    id: i64,
    code: Option<String>,
    name: String,
}

impl CourseRow {
    fn display(&self) -> String {
        format!("{} - {}", self.code.as_deref().unwrap_or(""), self.name)
    }
}

fn schedule_options(conn: &Connection) -> Result<Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, code, name FROM courses ORDER BY code, name, id")
        .map_err(|e| db_err("db_query_failed", "courses", e))?;
    let courses = stmt
        .query_map([], |r| {
            Ok(CourseRow {
                id: r.get(0)?,
                code: r.get(1)?,
                name: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "courses", e))?;
    let sections = db::list_sections(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;

    let mut options = Vec::new();
    for course in &courses {
        let mut owned = sections.iter().filter(|s| s.course_id == course.id).peekable();
        if owned.peek().is_none() {
            options.push(json!({
                "selection": SelectionToken::CreateUnderCourse(course.id).to_wire(),
                "courseId": course.id,
                "sectionId": null,
                "label": format!("{} (no section yet, one will be created)", course.display()),
            }));
            continue;
        }
        for s in owned {
            let section_label = s
                .label
                .clone()
                .unwrap_or_else(|| s.section_id.to_string());
            options.push(json!({
                "selection": SelectionToken::Direct(s.section_id).to_wire(),
                "courseId": course.id,
                "sectionId": s.section_id,
                "label": format!("{} / Section {}", course.display(), section_label),
            }));
        }
    }
    Ok(json!({ "options": options }))
}

fn schedule_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let Some(raw_selection) = params.get("selection") else {
        return Err(HandlerErr::bad_params("missing selection"));
    };
    let token = SelectionToken::parse(raw_selection).map_err(HandlerErr::bad_params)?;
    let day = opt_param_str(params, "dayOfWeek")?;
    let start = opt_param_str(params, "startTime")?;
    let end = opt_param_str(params, "endTime")?;
    let classroom = opt_param_str(params, "classroom")?;

    let defaults = setup::scheduling_defaults(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    let mut values = vec![
        ("day_of_week", day.map(SqlValue::Text)),
        ("start_time", start.map(SqlValue::Text)),
        ("end_time", end.map(SqlValue::Text)),
        (
            "classroom",
            Some(SqlValue::Text(classroom.unwrap_or(defaults.classroom))),
        ),
    ];
    // Validate times before any section gets created for the selection.
    apply_entity_rules(&SCHEDULE, &mut values, true)?;

    let mut store = SqlSectionStore {
        conn,
        default_label: defaults.section_label,
    };
    let resolved = resolve_section(token, &mut store).map_err(|e| match e {
        ResolutionError::Unresolved { course_id } => {
            HandlerErr::new("section_unresolved", "could not resolve/create section")
                .with_details(json!({ "courseId": course_id }))
        }
        ResolutionError::Store(e) => HandlerErr::new("db_insert_failed", format!("{e:#}"))
            .with_details(json!({ "table": "sections" })),
    })?;
    if resolved.created {
        info!(section_id = resolved.section_id, "section created for schedule entry");
    }

    values.insert(0, ("section_id", Some(SqlValue::Integer(resolved.section_id))));
    let id = insert_record(conn, &SCHEDULE, &values)?;
    Ok(json!({
        "id": id,
        "sectionId": resolved.section_id,
        "createdSection": resolved.created,
    }))
}

fn schedule_for_student(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = param_i64(params, "studentId")?;
    let sql = format!(
        "SELECT {}, c.code, c.name
         FROM class_schedule cs
         JOIN enrollments e ON e.section_id = cs.section_id
         JOIN sections s ON s.id = cs.section_id
         JOIN courses c ON c.id = s.course_id
         WHERE e.student_id = ?
         ORDER BY cs.day_of_week, cs.start_time, cs.id",
        SCHEDULE.select_list_as("cs")
    );
    let extra = SCHEDULE.readable_fields().count() + 1;
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err("db_query_failed", "class_schedule", e))?;
    let rows = stmt
        .query_map([student_id], |r| {
            let mut row = schema::row_to_json(&SCHEDULE, r)?;
            row["courseCode"] = json!(r.get::<_, Option<String>>(extra)?);
            row["courseName"] = json!(r.get::<_, String>(extra + 1)?);
            Ok(row)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "class_schedule", e))?;
    Ok(json!({ "studentId": student_id, "rows": rows }))
}

fn handle(state: &mut AppState, req: &Request, op: &str) -> Result<Value, HandlerErr> {
    let access = if op == "create" { Access::Staff } else { Access::Member };
    let session = require_session(req, access)?;
    let conn = require_db(state)?;
    match op {
        "options" => schedule_options(conn),
        "create" => schedule_create(conn, &req.params),
        _ => {
            let student_id = param_i64(&req.params, "studentId")?;
            ensure_may_view_student(&session, student_id)?;
            schedule_for_student(conn, &req.params)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let op = req.method.strip_prefix("schedule.")?;
    match op {
        "options" | "create" | "forStudent" => Some(respond(req, handle(state, req, op))),
        _ => None,
    }
}
