//! Application Layer - Use cases and port definitions.
//!
//! Coordinates the pull paths (limiter → cache → upstream) over the
//! domain types, against ports implemented by the infrastructure layer.

/// Outbound port interfaces (cache store, upstream data API).
pub mod ports;

/// Tier-aware data access coordination.
pub mod orchestrator;

/// Shared service wiring.
pub mod context;
