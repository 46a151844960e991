//! Cohort - autonomous robot-member runtime.
//!
//! Robots are autonomous members of a team. Triggers (clock ticks, human
//! interventions, external events) drive a six-phase pipeline per robot:
//! inspiration, goals, tasks, run, delivery, learning. This crate is the
//! orchestration substrate around that pipeline:
//!
//! - Hot robot cache with a team index and background refresh
//! - Trigger ingress with validation and a one-minute clock ticker
//! - Time-window plus semantic deduplication
//! - Priority worker pool with global and per-robot quotas
//! - Execution controller (pause/resume/stop, timeouts, cancellation)
//! - Six-phase executor with a multi-turn, validator-driven task runner
//! - Multi-target delivery fan-out (email, webhook, process)
//!
//! LLM backends, stores, messengers, and attachment services are external
//! collaborators behind the ports in [`domain::ports`]. Wrap
//! [`services::system::CoreSystem`] to expose an API surface.

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export the facade for convenience
pub use services::system::CoreSystem;
