//! Constraint slot registry
//!
//! Every constraint owns a `KeyedStore` of semaphores, one per distinct
//! `label=value` it has matched so far. A host entering its unavailability
//! window takes one permit from each matching constraint, always in
//! declaration order, so two hosts with overlapping constraint sets can never
//! wait on each other in opposite orders.

use crate::error::Result;
use crate::ids::StoreIdSequence;
use crate::keyed::KeyedStore;
use drover_types::{Constraint, Deployment, Host};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

struct ConstraintSlots {
    constraint: Constraint,
    slots: KeyedStore<Arc<Semaphore>>,
}

impl ConstraintSlots {
    fn slot_holder(&self, key: &str) -> Arc<Semaphore> {
        let capacity = self.constraint.max_unavailable as usize;
        self.slots.get_or_insert_with(key, || {
            info!(
                store = self.slots.name(),
                key = key,
                concurrency = capacity,
                "constraint slot holder created"
            );
            Arc::new(Semaphore::new(capacity))
        })
    }
}

/// Enforces the deployment's constraints across concurrent pipelines
pub struct ConstraintRegistry {
    constraints: Vec<ConstraintSlots>,
}

impl ConstraintRegistry {
    /// Build a registry, rejecting zero-capacity constraints up front
    pub fn new(constraints: &[Constraint], ids: &mut StoreIdSequence) -> Result<Self> {
        let mut built = Vec::with_capacity(constraints.len());
        for constraint in constraints {
            constraint.validate()?;
            built.push(ConstraintSlots {
                constraint: constraint.clone(),
                slots: KeyedStore::new(ids.next_name()),
            });
        }
        Ok(Self { constraints: built })
    }

    pub fn from_deployment(deployment: &Deployment) -> Result<Self> {
        let mut ids = StoreIdSequence::new("constraint");
        Self::new(&deployment.meta.constraints, &mut ids)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Slot keys the host would take, in acquisition order
    pub fn matching_keys(&self, host: &Host) -> Vec<String> {
        self.constraints
            .iter()
            .filter_map(|c| c.constraint.slot_key(&host.labels))
            .collect()
    }

    /// Constraints (in declaration order) that apply to the host
    pub fn matching_constraints(&self, host: &Host) -> Vec<&Constraint> {
        self.constraints
            .iter()
            .filter(|c| c.constraint.slot_key(&host.labels).is_some())
            .map(|c| &c.constraint)
            .collect()
    }

    /// Wait for a slot in every constraint matching the host.
    ///
    /// Dropping the returned future part-way releases whatever was already
    /// acquired.
    pub async fn acquire_all(&self, host: &Host) -> Result<ConstraintGuard> {
        let mut held = Vec::new();

        for slots in &self.constraints {
            let Some(key) = slots.constraint.slot_key(&host.labels) else {
                continue;
            };
            let holder = slots.slot_holder(&key);

            debug!(host = %host.name, key = %key, available = holder.available_permits(), "waiting for slot");
            let permit = holder
                .acquire_owned()
                .await
                .map_err(|_| crate::error::RegistryError::SlotHolderClosed(key.clone()))?;
            debug!(host = %host.name, key = %key, "slot acquired");

            held.push(HeldSlot { key, permit });
        }

        Ok(ConstraintGuard {
            host: host.name.clone(),
            held,
        })
    }

    /// Free permits for a slot key of the constraint at `index`, if the holder
    /// exists yet
    pub fn available(&self, index: usize, key: &str) -> Option<usize> {
        let slots = self.constraints.get(index)?;
        slots.slots.get(key).ok().map(|s| s.available_permits())
    }
}

impl std::fmt::Debug for ConstraintRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.constraints.iter().map(|c| &c.constraint))
            .finish()
    }
}

struct HeldSlot {
    key: String,
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
}

/// Slots held by one host.
///
/// `release` frees them exactly once; later calls and the eventual drop are
/// no-ops.
pub struct ConstraintGuard {
    host: String,
    held: Vec<HeldSlot>,
}

impl ConstraintGuard {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn keys(&self) -> Vec<String> {
        self.held.iter().map(|h| h.key.clone()).collect()
    }

    pub fn is_released(&self) -> bool {
        self.held.is_empty()
    }

    /// Give every slot back; returns how many were freed by this call
    pub fn release(&mut self) -> usize {
        let released = std::mem::take(&mut self.held);
        if !released.is_empty() {
            debug!(host = %self.host, slots = released.len(), "slots released");
        }
        released.len()
    }
}

impl Drop for ConstraintGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ConstraintGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstraintGuard")
            .field("host", &self.host)
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use drover_types::{ConfigurationError, LabelSelector, WILDCARD};
    use std::time::Duration;

    fn registry(constraints: Vec<Constraint>) -> ConstraintRegistry {
        ConstraintRegistry::new(&constraints, &mut StoreIdSequence::new("test")).unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected_at_construction() {
        let result = ConstraintRegistry::new(
            &[Constraint::new(LabelSelector::new("rack", "1"), 0)],
            &mut StoreIdSequence::default(),
        );
        assert!(matches!(
            result,
            Err(RegistryError::Configuration(
                ConfigurationError::ZeroCapacityConstraint { .. }
            ))
        ));
    }

    #[test]
    fn test_matching_keys_in_declaration_order() {
        let registry = registry(vec![
            Constraint::new(LabelSelector::new("rack", WILDCARD), 1),
            Constraint::new(LabelSelector::new("env", "prod"), 2),
            Constraint::new(LabelSelector::new("env", "staging"), 2),
        ]);
        let host = Host::new("web1")
            .with_label("env", "prod")
            .with_label("rack", "4");

        assert_eq!(registry.matching_keys(&host), vec!["rack=4", "env=prod"]);
        assert_eq!(registry.matching_constraints(&host).len(), 2);
        assert!(registry.matching_keys(&Host::new("bare")).is_empty());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let registry = registry(vec![Constraint::new(LabelSelector::new("rack", "1"), 1)]);
        let host = Host::new("web1").with_label("rack", "1");

        let mut guard = registry.acquire_all(&host).await.unwrap();
        assert_eq!(registry.available(0, "rack=1"), Some(0));

        assert_eq!(guard.release(), 1);
        assert_eq!(guard.release(), 0);
        drop(guard);

        assert_eq!(registry.available(0, "rack=1"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_host_waits_for_slot() {
        let registry = registry(vec![Constraint::new(LabelSelector::new("rack", "1"), 1)]);
        let first = Host::new("web1").with_label("rack", "1");
        let second = Host::new("web2").with_label("rack", "1");

        let guard = registry.acquire_all(&first).await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_secs(5), registry.acquire_all(&second)).await;
        assert!(blocked.is_err(), "second host entered a full window");

        drop(guard);
        let guard = tokio::time::timeout(Duration::from_secs(5), registry.acquire_all(&second))
            .await
            .expect("slot was not handed over")
            .unwrap();
        assert_eq!(guard.keys(), vec!["rack=1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_values_have_distinct_budgets() {
        let registry = registry(vec![Constraint::new(LabelSelector::new("rack", WILDCARD), 1)]);

        let _a = registry
            .acquire_all(&Host::new("a").with_label("rack", "1"))
            .await
            .unwrap();
        let b = tokio::time::timeout(
            Duration::from_secs(1),
            registry.acquire_all(&Host::new("b").with_label("rack", "2")),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_acquire_releases_partial_slots() {
        let registry = registry(vec![
            Constraint::new(LabelSelector::new("env", "prod"), 1),
            Constraint::new(LabelSelector::new("rack", "1"), 1),
        ]);
        let holder = Host::new("a").with_label("rack", "1");
        let waiter = Host::new("b")
            .with_label("env", "prod")
            .with_label("rack", "1");

        let _rack = registry.acquire_all(&holder).await.unwrap();

        // b gets env=prod, then blocks on rack=1 until the timeout drops it
        let attempt =
            tokio::time::timeout(Duration::from_secs(1), registry.acquire_all(&waiter)).await;
        assert!(attempt.is_err());
        assert_eq!(registry.available(0, "env=prod"), Some(1));
    }

    #[tokio::test]
    async fn test_unlabelled_host_takes_nothing() {
        let registry = registry(vec![Constraint::new(LabelSelector::new("rack", "1"), 1)]);
        let guard = registry.acquire_all(&Host::new("loner")).await.unwrap();
        assert!(guard.is_released());
        assert!(guard.keys().is_empty());
    }
}
