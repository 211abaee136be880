//! Composite string keys of the form `namespace:group:subject`.
//!
//! Index names drop trailing components (`namespace`, `namespace:group`);
//! the matching scan pattern appends `:*`.

mod key_set;
pub use key_set::*;


use crate::ConcernError;
use crate::Result;
use crate::SubjectId;
use crate::SubjectKind;

pub const KEY_SEPARATOR: char = ':';
pub const KEY_WILDCARD: &str = "*";

/// Record families owned by the state manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    ConcernState,
    ConcernConfig,
    AtAllMark,
    FreshMark,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::ConcernState,
        Namespace::ConcernConfig,
        Namespace::AtAllMark,
        Namespace::FreshMark,
    ];

    pub fn default_name(self) -> &'static str {
        match self {
            Namespace::ConcernState => "g-concern-state",
            Namespace::ConcernConfig => "g-concern-config",
            Namespace::AtAllMark => "g-atall-mark",
            Namespace::FreshMark => "fresh-mark",
        }
    }

    /// Namespaces scoped by group code.
    pub fn is_grouped(self) -> bool {
        !matches!(self, Namespace::FreshMark)
    }
}

/// Builds and parses the keys of one platform.
///
/// Each implementation serves a single subject domain; parsing always
/// yields ids of [`KeySpace::subject_kind`].
pub trait KeySpace: Send + Sync + 'static {
    fn namespace(
        &self,
        ns: Namespace,
    ) -> &str;

    fn subject_kind(&self) -> SubjectKind;

    /// Prefix for namespaces added by platform extensions.
    fn platform(&self) -> Option<&str>;

    /// Namespace name for records added outside the core families.
    fn extra_namespace(
        &self,
        name: &str,
    ) -> String {
        match self.platform() {
            Some(p) => format!("{p}-{name}"),
            None => name.to_string(),
        }
    }

    fn index(
        &self,
        ns: Namespace,
    ) -> String {
        self.namespace(ns).to_string()
    }

    fn group_index(
        &self,
        ns: Namespace,
        group: i64,
    ) -> String {
        format!("{}{KEY_SEPARATOR}{group}", self.namespace(ns))
    }

    fn group_key(
        &self,
        ns: Namespace,
        group: i64,
        id: &SubjectId,
    ) -> String {
        format!("{}{KEY_SEPARATOR}{group}{KEY_SEPARATOR}{id}", self.namespace(ns))
    }

    fn subject_key(
        &self,
        ns: Namespace,
        id: &SubjectId,
    ) -> String {
        format!("{}{KEY_SEPARATOR}{id}", self.namespace(ns))
    }

    /// Inverse of [`KeySpace::group_key`].
    fn parse_group_key(
        &self,
        ns: Namespace,
        key: &str,
    ) -> Result<(i64, SubjectId)> {
        let rest = strip_namespace(self.namespace(ns), key)?;
        let (group, subject) = rest
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| ConcernError::InvalidKey { key: key.to_string() })?;
        let group = group
            .parse::<i64>()
            .map_err(|_| ConcernError::InvalidKey { key: key.to_string() })?;
        let id = SubjectId::parse(self.subject_kind(), subject)?;
        Ok((group, id))
    }

    /// Inverse of [`KeySpace::subject_key`].
    fn parse_subject_key(
        &self,
        ns: Namespace,
        key: &str,
    ) -> Result<SubjectId> {
        let rest = strip_namespace(self.namespace(ns), key)?;
        SubjectId::parse(self.subject_kind(), rest)
    }
}

/// Scan pattern covering every key below `index`.
pub fn pattern(index: &str) -> String {
    format!("{index}{KEY_SEPARATOR}{KEY_WILDCARD}")
}

fn strip_namespace<'a>(
    namespace: &str,
    key: &'a str,
) -> Result<&'a str> {
    key.strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix(KEY_SEPARATOR))
        .ok_or_else(|| ConcernError::InvalidKey { key: key.to_string() }.into())
}
