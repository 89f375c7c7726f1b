//! Data Transfer Objects for the HTTP API
//!
//! Request and response shapes exposed by the orchestrator. DTOs are
//! lightweight representations of domain entities optimized for transfer;
//! persistence stays on the domain types.

pub mod blueprint;
pub mod deploy;
pub mod intent;
