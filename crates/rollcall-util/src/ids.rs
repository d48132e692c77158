//! Strongly-typed identifiers for rollcall

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a training class
    ClassId
);
uuid_id!(
    /// Identifier of a scheduled class session
    SessionId
);
uuid_id!(
    /// Identifier of a student
    StudentId
);
uuid_id!(
    /// Identifier of an enrollment request
    RequestId
);
uuid_id!(
    /// Identifier of a session registration
    RegistrationId
);
uuid_id!(
    /// Identifier of an attendance record
    AttendanceId
);

/// Identity of an administrator, supplied by the caller's auth context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminId(String);

impl AdminId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdminId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AdminId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AdminId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_id_equality() {
        let id1 = AdminId::new("admin-1");
        let id2 = AdminId::new("admin-1");
        let id3 = AdminId::new("admin-2");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn session_id_uniqueness() {
        let s1 = SessionId::new();
        let s2 = SessionId::new();
        assert_ne!(s1, s2);
    }

    #[test]
    fn ids_parse_from_display() {
        let class_id = ClassId::new();
        let parsed: ClassId = class_id.to_string().parse().unwrap();
        assert_eq!(class_id, parsed);

        assert!("not-a-uuid".parse::<StudentId>().is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        let student_id = StudentId::new();
        let json = serde_json::to_string(&student_id).unwrap();
        assert_eq!(json, format!("\"{}\"", student_id));

        let parsed: StudentId = serde_json::from_str(&json).unwrap();
        assert_eq!(student_id, parsed);
    }
}
