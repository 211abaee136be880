use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::ConcernError;
use crate::Result;

/// Which identifier domain a platform uses for its subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    /// Numeric platform id (room id, user id)
    Numeric,
    /// Opaque string handle (channel id, login name)
    Handle,
}

/// Identity of a watched subject.
///
/// Two ids are equal only if both the kind and the raw value match, so a
/// numeric `42` never equals the handle `"42"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubjectId {
    Numeric(i64),
    Handle(String),
}

impl SubjectId {
    pub fn kind(&self) -> SubjectKind {
        match self {
            SubjectId::Numeric(_) => SubjectKind::Numeric,
            SubjectId::Handle(_) => SubjectKind::Handle,
        }
    }

    /// Parses the key component of a subject in the given domain.
    pub fn parse(
        kind: SubjectKind,
        raw: &str,
    ) -> Result<SubjectId> {
        match kind {
            SubjectKind::Numeric => raw
                .parse::<i64>()
                .map(SubjectId::Numeric)
                .map_err(|e| ConcernError::InvalidSubject(format!("{raw}: {e}")).into()),
            SubjectKind::Handle => {
                if raw.is_empty() || raw == "*" {
                    return Err(ConcernError::InvalidSubject(format!("illegal handle {raw:?}")).into());
                }
                Ok(SubjectId::Handle(raw.to_string()))
            }
        }
    }

    pub fn as_numeric(&self) -> Option<i64> {
        match self {
            SubjectId::Numeric(v) => Some(*v),
            SubjectId::Handle(_) => None,
        }
    }

    pub fn as_handle(&self) -> Option<&str> {
        match self {
            SubjectId::Numeric(_) => None,
            SubjectId::Handle(h) => Some(h),
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            SubjectId::Numeric(v) => write!(f, "{v}"),
            SubjectId::Handle(h) => f.write_str(h),
        }
    }
}

impl From<i64> for SubjectId {
    fn from(v: i64) -> Self {
        SubjectId::Numeric(v)
    }
}

impl From<&str> for SubjectId {
    fn from(v: &str) -> Self {
        SubjectId::Handle(v.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(v: String) -> Self {
        SubjectId::Handle(v)
    }
}
