#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn admin() -> Value {
    json!({ "userId": 0, "role": "admin" })
}

pub fn teacher(user_id: i64) -> Value {
    json!({ "userId": user_id, "role": "teacher" })
}

pub fn student(user_id: i64) -> Value {
    json!({ "userId": user_id, "role": "student" })
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_registrard");
        let mut child = Command::new(exe)
            .env_remove("REGISTRARD_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn registrard");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 1,
        }
    }

    /// Spawns the daemon and opens a fresh workspace in it.
    pub fn with_workspace(prefix: &str) -> Self {
        let mut sidecar = Self::spawn();
        let workspace = temp_dir(prefix);
        sidecar.ok(
            None,
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        sidecar
    }

    pub fn send_line(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, session: Option<&Value>, method: &str, params: Value) -> Value {
        let id = self.next_id.to_string();
        self.next_id += 1;
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(s) = session {
            payload["session"] = s.clone();
        }
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, session: Option<&Value>, method: &str, params: Value) -> Value {
        let value = self.request(session, method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Asserts failure and returns the whole error object.
    pub fn fail(&mut self, session: Option<&Value>, method: &str, params: Value) -> Value {
        let value = self.request(session, method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().expect("error object")
    }

    pub fn create(&mut self, session: &Value, entity: &str, record: Value) -> i64 {
        let result = self.ok(
            Some(session),
            &format!("{}.create", entity),
            json!({ "record": record }),
        );
        result.get("id").and_then(|v| v.as_i64()).expect("created id")
    }
}

pub fn code(error: &Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

/// A department, a teacher, two students, and one course with one section.
pub struct Campus {
    pub teacher_id: i64,
    pub alice_id: i64,
    pub bob_id: i64,
    pub course_id: i64,
    pub section_id: i64,
}

pub fn seed_campus(sc: &mut Sidecar) -> Campus {
    let admin = admin();
    let department_id = sc.create(
        &admin,
        "departments",
        json!({ "name": "Computer Engineering", "facultyName": "Engineering" }),
    );
    let teacher_id = sc.create(
        &admin,
        "users",
        json!({
            "fullName": "Grace Hopper",
            "email": "grace@example.edu",
            "role": "Instructor",
            "departmentId": department_id,
            "password": "cobol"
        }),
    );
    let alice_id = sc.create(
        &admin,
        "users",
        json!({
            "fullName": "Alice Demir",
            "email": "alice@example.edu",
            "role": "student",
            "password": "12345",
            "studentNo": "2024001",
            "startYear": 2024
        }),
    );
    let bob_id = sc.create(
        &admin,
        "users",
        json!({
            "fullName": "Bob Kaya",
            "email": "bob@example.edu",
            "role": "student",
            "password": "hunter2"
        }),
    );
    let course_id = sc.create(
        &admin,
        "courses",
        json!({
            "code": "CS101",
            "name": "Intro to Programming",
            "credits": 4,
            "departmentId": department_id,
            "instructorId": teacher_id
        }),
    );
    let section_id = sc.create(&admin, "sections", json!({ "courseId": course_id, "label": "A" }));
    Campus {
        teacher_id,
        alice_id,
        bob_id,
        course_id,
        section_id,
    }
}
