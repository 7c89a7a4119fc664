//! Orchestrator Module
//!
//! The coordinator that owns the per-run state machine and the step loop.

mod coordinator;

pub use coordinator::{Coordinator, StepOverrides};
