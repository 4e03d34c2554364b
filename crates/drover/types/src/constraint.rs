//! Label-selector concurrency constraints
//!
//! A constraint says: among the hosts whose labels match the selector, at most
//! `max_unavailable` may be between activation and the end of their health
//! checks at any one time. Each distinct matched `label=value` pair gets its
//! own budget.

use crate::error::{ConfigurationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selector value matching any label value
pub const WILDCARD: &str = "*";

/// Selects hosts by one label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub label: String,
    pub value: String,
}

impl LabelSelector {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    /// True when the label names are equal and either side is a wildcard or
    /// the values are equal.
    pub fn matches(&self, label: &str, value: &str) -> bool {
        if self.label != label {
            return false;
        }
        self.value == WILDCARD || value == WILDCARD || self.value == value
    }
}

impl std::fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.label, self.value)
    }
}

/// "At most N unavailable" for hosts matching `selector`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub selector: LabelSelector,
    pub max_unavailable: u32,
}

impl Constraint {
    pub fn new(selector: LabelSelector, max_unavailable: u32) -> Self {
        Self {
            selector,
            max_unavailable,
        }
    }

    /// Reject constraints that would create a zero-capacity slot holder
    pub fn validate(&self) -> Result<()> {
        if self.max_unavailable == 0 {
            return Err(ConfigurationError::ZeroCapacityConstraint {
                label: self.selector.label.clone(),
                value: self.selector.value.clone(),
            });
        }
        Ok(())
    }

    /// The slot key (`label=value`) this constraint assigns to a host with
    /// the given labels, if any of them match.
    ///
    /// The key uses the host's value, so a wildcard selector gives every
    /// distinct value its own budget.
    pub fn slot_key(&self, labels: &BTreeMap<String, String>) -> Option<String> {
        labels
            .iter()
            .find(|(label, value)| self.selector.matches(label, value))
            .map(|(label, value)| slot_key(label, value))
    }
}

/// Key of the slot holder for one label value
pub fn slot_key(label: &str, value: &str) -> String {
    format!("{}={}", label, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_exact_match() {
        let selector = LabelSelector::new("rack", "1");
        assert!(selector.matches("rack", "1"));
        assert!(!selector.matches("rack", "2"));
        assert!(!selector.matches("row", "1"));
    }

    #[test]
    fn test_selector_wildcards() {
        let any_rack = LabelSelector::new("rack", WILDCARD);
        assert!(any_rack.matches("rack", "7"));
        assert!(!any_rack.matches("row", "7"));

        let exact = LabelSelector::new("rack", "1");
        assert!(exact.matches("rack", WILDCARD));
    }

    #[test]
    fn test_slot_key_uses_host_value() {
        let constraint = Constraint::new(LabelSelector::new("rack", WILDCARD), 1);
        assert_eq!(
            constraint.slot_key(&labels(&[("env", "prod"), ("rack", "3")])),
            Some("rack=3".to_string())
        );
        assert_eq!(constraint.slot_key(&labels(&[("env", "prod")])), None);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let constraint = Constraint::new(LabelSelector::new("rack", "1"), 0);
        assert_eq!(
            constraint.validate(),
            Err(ConfigurationError::ZeroCapacityConstraint {
                label: "rack".into(),
                value: "1".into(),
            })
        );
        assert!(Constraint::new(LabelSelector::new("rack", "1"), 1)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_constraint_from_json() {
        let constraint: Constraint = serde_json::from_str(
            r#"{"selector": {"label": "rack", "value": "*"}, "maxUnavailable": 2}"#,
        )
        .unwrap();
        assert_eq!(constraint.max_unavailable, 2);
        assert_eq!(constraint.selector.to_string(), "rack=*");
    }

    proptest! {
        #[test]
        fn test_wildcard_selector_matches_every_value(label in "[a-z]{1,8}", value in "[a-z0-9]{0,8}") {
            let selector = LabelSelector::new(label.clone(), WILDCARD);
            prop_assert!(selector.matches(&label, &value));
        }

        #[test]
        fn test_different_label_never_matches(value in "[a-z0-9*]{0,4}") {
            let selector = LabelSelector::new("rack", value.clone());
            prop_assert!(!selector.matches("row", &value));
        }
    }
}
