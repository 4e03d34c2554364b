//! Per-host pipeline stages

use serde::{Deserialize, Serialize};

/// How far a host's pipeline got.
///
/// Variants are declared in execution order, so `Ord` compares progress.
/// `Rebooting` and `Online` only occur when a reboot was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostStage {
    Pending,
    Built,
    Pushed,
    PreChecked,
    Activated,
    Rebooting,
    Online,
    PostChecked,
    Done,
}

impl HostStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStage::Pending => "pending",
            HostStage::Built => "built",
            HostStage::Pushed => "pushed",
            HostStage::PreChecked => "pre-checked",
            HostStage::Activated => "activated",
            HostStage::Rebooting => "rebooting",
            HostStage::Online => "online",
            HostStage::PostChecked => "post-checked",
            HostStage::Done => "done",
        }
    }
}

impl std::fmt::Display for HostStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
