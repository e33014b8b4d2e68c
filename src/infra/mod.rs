//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod primary;
pub mod telemetry;
