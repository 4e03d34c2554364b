//! drover Registry - Keyed stores and constraint slot registries
//!
//! This crate provides the shared state that concurrent host pipelines
//! coordinate through:
//!
//! - **KeyedStore**: string-keyed map with atomic get-or-set, used both as the
//!   build-artifact cache and as the per-label-value semaphore map
//! - **ConstraintRegistry**: turns `{selector, maxUnavailable}` rules into
//!   enforced concurrency bounds
//! - **StoreIdSequence**: names stores from a sequence owned by one
//!   deployment parse
//!
//! Stores are append-only for the lifetime of a run: keys are never removed.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod constraints;
pub mod error;
pub mod ids;
pub mod keyed;

// Re-exports
pub use constraints::{ConstraintGuard, ConstraintRegistry};
pub use error::{RegistryError, Result};
pub use ids::StoreIdSequence;
pub use keyed::KeyedStore;
