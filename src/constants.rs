// -
// Database namespaces

/// Sled tree holding every record of the engine
pub(crate) const CONCERN_TREE: &str = "_concern_state_tree";

/// Record family of platform status snapshots
pub const STATUS_NAMESPACE: &str = "current-status";
