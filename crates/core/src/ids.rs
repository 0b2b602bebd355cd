use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a scheduled task. Assigned monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The plugin (or other unit) that registered a task.
///
/// The scheduler never interprets it beyond equality: it groups tasks for
/// bulk cancellation and labels metrics and failure reports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(Arc<str>);

impl OwnerId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for OwnerId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_equality_is_by_name() {
        let a = OwnerId::new("economy");
        let b: OwnerId = "economy".into();
        let c: OwnerId = String::from("chat").into();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "economy");
        assert_eq!(c.to_string(), "chat");
    }

    #[test]
    fn task_id_display() {
        assert_eq!(TaskId(12).to_string(), "#12");
        assert!(TaskId(1) < TaskId(2));
    }
}
