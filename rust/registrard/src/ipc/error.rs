use rusqlite::ErrorCode;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("not_found", format!("{} not found", what))
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Maps SQLite failures to an error code, turning constraint violations into
/// messages an end user can act on.
pub fn db_err(code: &'static str, table: &str, e: rusqlite::Error) -> HandlerErr {
    let raw = e.to_string();
    let constraint = matches!(
        &e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
    );
    if constraint {
        let details = json!({ "table": table, "sqlite": raw });
        if raw.contains("UNIQUE constraint failed") {
            return HandlerErr::new(
                "conflict",
                "a record with the same unique value already exists",
            )
            .with_details(details);
        }
        if raw.contains("NOT NULL constraint failed") {
            return HandlerErr::bad_params("a required field was left empty").with_details(details);
        }
        if raw.contains("FOREIGN KEY constraint failed") {
            let message = if code == "db_delete_failed" {
                "record is still referenced by other records"
            } else {
                "a referenced record does not exist"
            };
            let code = if code == "db_delete_failed" {
                "conflict"
            } else {
                "bad_params"
            };
            return HandlerErr::new(code, message).with_details(details);
        }
    }
    HandlerErr::new(code, raw).with_details(json!({ "table": table }))
}
