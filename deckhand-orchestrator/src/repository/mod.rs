//! Persistence layer
//!
//! All database access for intents and their generated secrets. Each
//! submodule owns the queries for one table; conversion between rows and
//! domain types happens here and nowhere else.

pub mod intent;
pub mod secret;
