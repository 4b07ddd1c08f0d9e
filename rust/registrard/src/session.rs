use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Case-insensitive; `instructor` is stored by some imports and means teacher.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "teacher" | "instructor" => Some(Self::Teacher),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }

    pub fn is_admin(self) -> bool {
        self == Self::Admin
    }

    pub fn is_teacher(self) -> bool {
        self == Self::Teacher
    }

    pub fn is_student(self) -> bool {
        self == Self::Student
    }

    pub fn can_manage(self) -> bool {
        self.is_teacher() || self.is_admin()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: i64,
    pub role: Role,
}

/// Who may call a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Member,
    Staff,
    Admin,
}

impl Session {
    pub fn parse(raw: &serde_json::Value) -> Result<Self, String> {
        let Some(obj) = raw.as_object() else {
            return Err("session must be an object".to_string());
        };
        let Some(user_id) = obj.get("userId").and_then(|v| v.as_i64()) else {
            return Err("session.userId must be an integer".to_string());
        };
        let Some(role) = obj.get("role").and_then(|v| v.as_str()).and_then(Role::parse) else {
            return Err("session.role must be one of: student, teacher, admin".to_string());
        };
        Ok(Self { user_id, role })
    }

    pub fn allows(&self, access: Access) -> bool {
        match access {
            Access::Member => true,
            Access::Staff => self.role.can_manage(),
            Access::Admin => self.role.is_admin(),
        }
    }

    /// Students only ever see their own records; staff may look at anyone.
    pub fn may_view_student(&self, student_id: i64) -> bool {
        !self.role.is_student() || self.user_id == student_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_flags_derive_from_role() {
        assert!(Role::Admin.is_admin() && Role::Admin.can_manage());
        assert!(Role::Teacher.is_teacher() && Role::Teacher.can_manage());
        assert!(Role::Student.is_student() && !Role::Student.can_manage());
        assert_eq!(Role::parse("Instructor"), Some(Role::Teacher));
        assert_eq!(Role::parse(" ADMIN "), Some(Role::Admin));
        assert_eq!(Role::parse("dean"), None);
    }

    #[test]
    fn session_parse_and_access() {
        let s = Session::parse(&json!({ "userId": 4, "role": "Student" })).expect("parse");
        assert_eq!(s, Session { user_id: 4, role: Role::Student });
        assert!(s.allows(Access::Member));
        assert!(!s.allows(Access::Staff));
        assert!(s.may_view_student(4));
        assert!(!s.may_view_student(5));

        let t = Session::parse(&json!({ "userId": 2, "role": "teacher" })).expect("parse");
        assert!(t.allows(Access::Staff));
        assert!(!t.allows(Access::Admin));
        assert!(t.may_view_student(5));

        assert!(Session::parse(&json!({ "userId": "x", "role": "admin" })).is_err());
        assert!(Session::parse(&json!({ "userId": 1 })).is_err());
        assert!(Session::parse(&json!("admin")).is_err());
    }
}
