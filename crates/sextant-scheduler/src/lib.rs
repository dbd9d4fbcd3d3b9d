//! Sextant Scheduler - Pressure-based node prioritization
//!
//! This crate provides:
//! - Resource normalization against fleet maxima
//! - Node scoring from weighted pressure ratios
//! - Concurrent, deadline-bounded prioritization of candidate nodes
//! - Backend health tracking and node diagnostics

pub mod diagnostics;
pub mod error;
pub mod health;
pub mod normalize;
pub mod prioritizer;
pub mod score;
pub mod types;

// Re-export commonly used types
pub use diagnostics::{
    inspect_fleet, inspect_node, FleetDiagnostics, KindDiagnostics, NodeDiagnostics, ValueDiagnostics,
};
pub use error::{Result, SchedulerError};
pub use health::BackendHealth;
pub use normalize::normalize;
pub use prioritizer::{Prioritizer, PrioritizerConfig};
pub use score::{NodeScorer, ScorerConfig};
pub use types::{FleetMaxima, Phase, PrioritizeStats, Prioritization};
