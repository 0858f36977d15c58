//! Clients domain module.
//!
//! Business rules for travel agency clients, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod client;

pub use client::{Client, Email, NewClient, Pesel, ValidClient};
