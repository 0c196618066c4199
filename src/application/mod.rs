//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages runtime behavior:
//! - Budget tracking over the store port
//! - The store-backed circuit breaker
//! - The decision engine tying budgets, breaker, and thresholds together
//! - Decision metrics
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod budget;
pub mod circuit_breaker;
pub mod engine;
pub mod metrics;
pub mod ports;
