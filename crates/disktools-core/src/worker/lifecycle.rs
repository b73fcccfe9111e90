use serde::{Deserialize, Serialize};

/// Where a cache manager is in its install → activate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No ready bucket for this version.
    #[default]
    Uninstalled,
    /// The current bucket is populated but requests are not yet intercepted.
    Installed,
    /// Stale buckets are gone and requests go through the manager.
    Active,
}

impl LifecycleState {
    pub fn can_install(self) -> bool {
        matches!(self, LifecycleState::Uninstalled | LifecycleState::Installed)
    }

    pub fn can_activate(self) -> bool {
        matches!(self, LifecycleState::Installed | LifecycleState::Active)
    }

    pub fn is_active(self) -> bool {
        self == LifecycleState::Active
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Uninstalled => write!(f, "uninstalled"),
            LifecycleState::Installed => write!(f, "installed"),
            LifecycleState::Active => write!(f, "active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(LifecycleState::Uninstalled.can_install());
        assert!(LifecycleState::Installed.can_install());
        assert!(!LifecycleState::Active.can_install());

        assert!(!LifecycleState::Uninstalled.can_activate());
        assert!(LifecycleState::Installed.can_activate());
        assert!(LifecycleState::Active.can_activate());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&LifecycleState::Active).unwrap(), "\"active\"");
        let parsed: LifecycleState = serde_json::from_str("\"installed\"").unwrap();
        assert_eq!(parsed, LifecycleState::Installed);
    }
}
