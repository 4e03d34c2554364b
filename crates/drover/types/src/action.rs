//! Activation actions and rollout goals

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What the activation step does on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationAction {
    /// Activate now and make it the default boot entry
    Switch,
    /// Make it the default boot entry without activating now
    Boot,
    /// Report what would change without applying anything
    DryActivate,
    /// Activate now without touching the boot entry
    Test,
}

impl ActivationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationAction::Switch => "switch",
            ActivationAction::Boot => "boot",
            ActivationAction::DryActivate => "dry-activate",
            ActivationAction::Test => "test",
        }
    }

    /// Whether the system profile must point at the new closure
    pub fn sets_profile(&self) -> bool {
        matches!(self, ActivationAction::Switch | ActivationAction::Boot)
    }
}

impl std::fmt::Display for ActivationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "switch" => Ok(ActivationAction::Switch),
            "boot" => Ok(ActivationAction::Boot),
            "dry-activate" => Ok(ActivationAction::DryActivate),
            "test" => Ok(ActivationAction::Test),
            other => Err(format!(
                "unknown action '{}' (expected switch, boot, dry-activate or test)",
                other
            )),
        }
    }
}

/// How far a run takes each host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RolloutGoal {
    /// Stop once the closure is built
    Build,
    /// Stop once the closure is on the host
    Push,
    /// Go all the way through activation
    Deploy(ActivationAction),
}

impl RolloutGoal {
    pub fn pushes(&self) -> bool {
        !matches!(self, RolloutGoal::Build)
    }

    pub fn action(&self) -> Option<ActivationAction> {
        match self {
            RolloutGoal::Deploy(action) => Some(*action),
            _ => None,
        }
    }
}

impl std::fmt::Display for RolloutGoal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RolloutGoal::Build => f.write_str("build"),
            RolloutGoal::Push => f.write_str("push"),
            RolloutGoal::Deploy(action) => write!(f, "deploy {}", action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trips_through_str() {
        for action in [
            ActivationAction::Switch,
            ActivationAction::Boot,
            ActivationAction::DryActivate,
            ActivationAction::Test,
        ] {
            assert_eq!(action.as_str().parse::<ActivationAction>(), Ok(action));
        }
        assert!("reboot".parse::<ActivationAction>().is_err());
    }

    #[test]
    fn test_profile_actions() {
        assert!(ActivationAction::Switch.sets_profile());
        assert!(ActivationAction::Boot.sets_profile());
        assert!(!ActivationAction::Test.sets_profile());
        assert!(!ActivationAction::DryActivate.sets_profile());
    }

    #[test]
    fn test_goal_accessors() {
        assert!(!RolloutGoal::Build.pushes());
        assert!(RolloutGoal::Push.pushes());
        assert_eq!(
            RolloutGoal::Deploy(ActivationAction::Test).action(),
            Some(ActivationAction::Test)
        );
        assert_eq!(RolloutGoal::Push.action(), None);
    }
}
