//! Observability: stage profiling.
//!
//! Logging goes through `tracing` directly; this module holds the pieces
//! that need shared state.

pub mod profiling;

pub use profiling::{
    current_memory_bytes, enable_profiling, get_profile_report, is_profiling_enabled,
    profile_stage, reset_profile_data, ProfileReport, StageProfile,
};
