use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::{Access, Session};
use rusqlite::Connection;
use serde_json::{Map, Value};

pub fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_session(req: &Request, access: Access) -> Result<Session, HandlerErr> {
    let Some(raw) = req.session.as_ref().filter(|v| !v.is_null()) else {
        return Err(HandlerErr::new("unauthorized", "sign in first"));
    };
    let session = Session::parse(raw).map_err(|m| HandlerErr::new("unauthorized", m))?;
    if !session.allows(access) {
        return Err(HandlerErr::new(
            "forbidden",
            format!("{} may not call {}", session.role.as_str(), req.method),
        ));
    }
    Ok(session)
}

/// Integer ids arrive as numbers or numeric strings depending on the caller.
pub fn opt_param_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| HandlerErr::bad_params(format!("{} must be an integer", key))),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn param_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    opt_param_i64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn opt_param_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn param_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    opt_param_str(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn param_object<'a>(params: &'a Value, key: &str) -> Result<&'a Map<String, Value>, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an object", key)))
}

/// Students asking about another student are refused; staff pass through.
pub fn ensure_may_view_student(session: &Session, student_id: i64) -> Result<(), HandlerErr> {
    if session.may_view_student(student_id) {
        Ok(())
    } else {
        Err(HandlerErr::new(
            "forbidden",
            "students may only view their own records",
        ))
    }
}

/// `HH:MM` gets seconds appended; `HH:MM:SS` is kept.
pub fn normalize_clock_time(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m] => (*h, *m, "00"),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    let s: u32 = s.parse().ok()?;
    if h > 23 || m > 59 || s > 59 {
        return None;
    }
    Some(format!("{:02}:{:02}:{:02}", h, m, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clock_times_get_seconds() {
        assert_eq!(normalize_clock_time("09:00").as_deref(), Some("09:00:00"));
        assert_eq!(normalize_clock_time("9:5").as_deref(), Some("09:05:00"));
        assert_eq!(normalize_clock_time("10:50:30").as_deref(), Some("10:50:30"));
        assert_eq!(normalize_clock_time("24:00"), None);
        assert_eq!(normalize_clock_time("noon"), None);
    }

    #[test]
    fn integer_params_accept_strings() {
        let p = json!({ "a": 3, "b": "4", "c": "", "d": "x", "e": 1.5 });
        assert_eq!(opt_param_i64(&p, "a").expect("a"), Some(3));
        assert_eq!(opt_param_i64(&p, "b").expect("b"), Some(4));
        assert_eq!(opt_param_i64(&p, "c").expect("c"), None);
        assert!(opt_param_i64(&p, "d").is_err());
        assert!(opt_param_i64(&p, "e").is_err());
        assert_eq!(param_i64(&p, "zz").expect_err("missing").code, "bad_params");
    }
}
