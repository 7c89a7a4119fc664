//! Tasks Module
//!
//! The task/trajectory data model, the teacher-side generator and the
//! answer verifier.

pub mod generator;
mod schema;
pub mod verifier;

pub use generator::{PromptOverride, TaskGenerator, TaskSignal};
pub use schema::{Domain, RewardBreakdown, Task, ToolCall, ToolStatus, Trajectory, VerifierSpec};
pub use verifier::{Verdict, VerdictStatus, Verifier};
