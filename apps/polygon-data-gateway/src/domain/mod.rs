//! Domain Layer - Core data types and business logic.
//!
//! This layer contains the core domain types for tiered market data
//! distribution with no external service dependencies. All types here
//! are pure Rust with serialization support.

/// Subscription tier table and per-tier policy.
pub mod tier;

/// Canonical market data types and downstream stream messages.
pub mod market;

/// Symbol-to-sink registry with upstream change tracking.
pub mod subscription;
