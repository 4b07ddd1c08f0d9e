//! Static entity definitions for the generic record methods, plus the single
//! place where request values are normalized before they reach SQL.

use crate::session::Access;
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    /// Write-only; stored as a SHA-256 hex digest and never read back.
    Secret,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub json: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn field(json: &'static str, column: &'static str, kind: FieldKind) -> Field {
    Field {
        json,
        column,
        kind,
        required: false,
    }
}

const fn required(json: &'static str, column: &'static str, kind: FieldKind) -> Field {
    Field {
        json,
        column,
        kind,
        required: true,
    }
}

#[derive(Debug)]
pub struct Entity {
    /// Method prefix, e.g. `departments` for `departments.list`.
    pub name: &'static str,
    pub table: &'static str,
    pub label: &'static str,
    pub fields: &'static [Field],
    pub read: Access,
    pub write: Access,
    /// Column holding the student a row belongs to; student sessions are
    /// limited to their own rows.
    pub owner_column: Option<&'static str>,
}

impl Entity {
    pub fn field_by_json(&self, key: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.json == key)
    }

    pub fn readable_fields(&self) -> impl Iterator<Item = &'static Field> {
        self.fields.iter().filter(|f| f.kind != FieldKind::Secret)
    }

    pub fn select_list(&self) -> String {
        let mut cols = vec!["id".to_string()];
        cols.extend(self.readable_fields().map(|f| f.column.to_string()));
        cols.join(", ")
    }

    /// Same columns as `select_list`, qualified for use in joins.
    pub fn select_list_as(&self, alias: &str) -> String {
        let mut cols = vec![format!("{}.id", alias)];
        cols.extend(self.readable_fields().map(|f| format!("{}.{}", alias, f.column)));
        cols.join(", ")
    }
}

use FieldKind::{Integer, Real, Secret, Text};

pub static DEPARTMENTS: Entity = Entity {
    name: "departments",
    table: "departments",
    label: "department",
    fields: &[
        required("name", "name", Text),
        field("facultyName", "faculty_name", Text),
    ],
    read: Access::Member,
    write: Access::Staff,
    owner_column: None,
};

pub static USERS: Entity = Entity {
    name: "users",
    table: "users",
    label: "user",
    fields: &[
        required("fullName", "full_name", Text),
        required("email", "email", Text),
        required("role", "role", Text),
        field("departmentId", "department_id", Integer),
        field("password", "password_hash", Secret),
        field("gender", "gender", Text),
        field("studentNo", "student_no", Text),
        field("startYear", "start_year", Integer),
    ],
    read: Access::Member,
    write: Access::Staff,
    owner_column: None,
};

pub static COURSES: Entity = Entity {
    name: "courses",
    table: "courses",
    label: "course",
    fields: &[
        field("code", "code", Text),
        required("name", "name", Text),
        field("credits", "credits", Real),
        field("departmentId", "department_id", Integer),
        field("instructorId", "instructor_id", Integer),
        field("capacity", "capacity", Integer),
    ],
    read: Access::Member,
    write: Access::Staff,
    owner_column: None,
};

pub static SECTIONS: Entity = Entity {
    name: "sections",
    table: "sections",
    label: "section",
    fields: &[
        required("courseId", "course_id", Integer),
        field("label", "label", Text),
    ],
    read: Access::Member,
    write: Access::Staff,
    owner_column: None,
};

pub static ENROLLMENTS: Entity = Entity {
    name: "enrollments",
    table: "enrollments",
    label: "enrollment",
    fields: &[
        required("studentId", "student_id", Integer),
        required("sectionId", "section_id", Integer),
        field("enrollmentDate", "enrollment_date", Text),
    ],
    read: Access::Member,
    write: Access::Staff,
    owner_column: Some("student_id"),
};

pub static EXAM_RESULTS: Entity = Entity {
    name: "examResults",
    table: "exam_results",
    label: "exam result",
    fields: &[
        required("studentId", "student_id", Integer),
        required("sectionId", "section_id", Integer),
        field("examType", "exam_type", Text),
        field("score", "score", Real),
        field("letterGrade", "letter_grade", Text),
    ],
    read: Access::Member,
    write: Access::Staff,
    owner_column: Some("student_id"),
};

pub static SCHEDULE: Entity = Entity {
    name: "schedule",
    table: "class_schedule",
    label: "schedule entry",
    fields: &[
        required("sectionId", "section_id", Integer),
        field("dayOfWeek", "day_of_week", Text),
        field("startTime", "start_time", Text),
        field("endTime", "end_time", Text),
        field("classroom", "classroom", Text),
    ],
    read: Access::Member,
    write: Access::Staff,
    owner_column: None,
};

pub static ENTITIES: [&Entity; 7] = [
    &DEPARTMENTS,
    &USERS,
    &COURSES,
    &SECTIONS,
    &ENROLLMENTS,
    &EXAM_RESULTS,
    &SCHEDULE,
];

pub fn entity_by_name(name: &str) -> Option<&'static Entity> {
    ENTITIES.iter().copied().find(|e| e.name == name)
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("unknown field for {entity}: {field}")]
    UnknownField { entity: &'static str, field: String },
    #[error("{field} must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("missing required field: {field}")]
    Missing { field: &'static str },
}

pub fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Absent, `null` and blank strings all mean "not provided".
pub fn normalize(field: &'static Field, raw: &Value) -> Result<Option<SqlValue>, NormalizeError> {
    let wrong = |expected| NormalizeError::WrongType {
        field: field.json,
        expected,
    };
    match raw {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        _ => {}
    }
    let v = match field.kind {
        Text => match raw {
            Value::String(s) => SqlValue::Text(s.trim().to_string()),
            Value::Number(n) => SqlValue::Text(n.to_string()),
            _ => return Err(wrong("a string")),
        },
        Secret => match raw {
            Value::String(s) => SqlValue::Text(hash_secret(s)),
            _ => return Err(wrong("a string")),
        },
        Integer => match raw {
            Value::Number(n) => SqlValue::Integer(n.as_i64().ok_or_else(|| wrong("an integer"))?),
            Value::String(s) => {
                SqlValue::Integer(s.trim().parse::<i64>().map_err(|_| wrong("an integer"))?)
            }
            _ => return Err(wrong("an integer")),
        },
        Real => match raw {
            Value::Number(n) => SqlValue::Real(n.as_f64().ok_or_else(|| wrong("a number"))?),
            Value::String(s) => {
                let x = s.trim().parse::<f64>().map_err(|_| wrong("a number"))?;
                if !x.is_finite() {
                    return Err(wrong("a number"));
                }
                SqlValue::Real(x)
            }
            _ => return Err(wrong("a number")),
        },
    };
    Ok(Some(v))
}

/// Validates a create/update body against the entity. Returns (column, value)
/// pairs in declaration order. Required fields are only enforced on create.
pub fn normalize_record(
    entity: &'static Entity,
    body: &Map<String, Value>,
    for_create: bool,
) -> Result<Vec<(&'static str, Option<SqlValue>)>, NormalizeError> {
    for key in body.keys() {
        if entity.field_by_json(key).is_none() {
            return Err(NormalizeError::UnknownField {
                entity: entity.name,
                field: key.clone(),
            });
        }
    }
    let mut out = Vec::new();
    for f in entity.fields {
        match body.get(f.json) {
            Some(raw) => {
                let v = normalize(f, raw)?;
                if v.is_none() && f.required {
                    return Err(NormalizeError::Missing { field: f.json });
                }
                out.push((f.column, v));
            }
            None if for_create && f.required => {
                return Err(NormalizeError::Missing { field: f.json });
            }
            None => {}
        }
    }
    Ok(out)
}

pub fn sql_to_json(v: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef;
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Reads a row selected with `Entity::select_list` into a camelCase object.
pub fn row_to_json(entity: &Entity, row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let mut obj = Map::new();
    obj.insert("id".to_string(), Value::from(row.get::<_, i64>(0)?));
    for (i, f) in entity.readable_fields().enumerate() {
        obj.insert(f.json.to_string(), sql_to_json(row.get_ref(i + 1)?));
    }
    Ok(Value::Object(obj))
}
