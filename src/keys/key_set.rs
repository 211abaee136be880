use super::KeySpace;
use super::Namespace;
use crate::SubjectKind;

/// Default [`KeySpace`]: the stock namespaces, optionally prefixed by a
/// platform name so that platforms with different subject domains never
/// share keys.
#[derive(Debug, Clone)]
pub struct KeySet {
    platform: Option<String>,
    kind: SubjectKind,
    names: [String; 4],
}

impl KeySet {
    pub fn new(kind: SubjectKind) -> Self {
        Self {
            platform: None,
            kind,
            names: Namespace::ALL.map(|ns| ns.default_name().to_string()),
        }
    }

    pub fn for_platform(
        platform: &str,
        kind: SubjectKind,
    ) -> Self {
        Self {
            platform: Some(platform.to_string()),
            kind,
            names: Namespace::ALL.map(|ns| format!("{platform}-{}", ns.default_name())),
        }
    }
}

impl KeySpace for KeySet {
    fn namespace(
        &self,
        ns: Namespace,
    ) -> &str {
        let slot = match ns {
            Namespace::ConcernState => 0,
            Namespace::ConcernConfig => 1,
            Namespace::AtAllMark => 2,
            Namespace::FreshMark => 3,
        };
        &self.names[slot]
    }

    fn subject_kind(&self) -> SubjectKind {
        self.kind
    }

    fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }
}
