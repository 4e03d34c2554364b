//! Rollout Context - Shared state for the host pipelines of one run
//!
//! Everything in here is created once per run and shared by reference
//! counting between the pipelines: the collaborators, the artifact cache, the
//! constraint registry and the event channel.

use crate::artifacts::{ArtifactCache, BuildBatch};
use crate::collaborators::Collaborators;
use crate::reboot::RebootSettings;
use drover_registry::ConstraintRegistry;
use drover_types::{RolloutEvent, RolloutEventEnvelope, RolloutGoal};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Per-run options consulted by every pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub goal: RolloutGoal,
    /// Reboot after activation and wait for the host to come back
    pub reboot: Option<RebootSettings>,
}

pub struct RolloutContext {
    pub collaborators: Collaborators,
    pub cache: ArtifactCache,
    pub batch: BuildBatch,
    pub constraints: ConstraintRegistry,
    pub options: PipelineOptions,
    events: broadcast::Sender<RolloutEventEnvelope>,
}

impl RolloutContext {
    pub fn new(
        collaborators: Collaborators,
        cache: ArtifactCache,
        batch: BuildBatch,
        constraints: ConstraintRegistry,
        options: PipelineOptions,
        events: broadcast::Sender<RolloutEventEnvelope>,
    ) -> Arc<Self> {
        Arc::new(Self {
            collaborators,
            cache,
            batch,
            constraints,
            options,
            events,
        })
    }

    /// Publish an event; having no subscribers is fine
    pub fn emit(&self, event: RolloutEvent) {
        let _ = self.events.send(RolloutEventEnvelope::new(event));
    }
}

impl std::fmt::Debug for RolloutContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolloutContext")
            .field("options", &self.options)
            .field("constraints", &self.constraints)
            .field("cached", &self.cache.len())
            .finish()
    }
}
