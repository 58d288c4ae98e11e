//! Fleet rollout orchestration
//!
//! This module handles:
//! - Driving each device through connect, install and disconnect
//! - Pacing between devices and the optional concurrency cap
//! - Containing per-device failures so the fleet pass always continues
//! - Stopping cleanly on operator interruption with partial results

mod orchestrator;

pub use orchestrator::Orchestrator;
