//! Clients domain module.
//!
//! Clients own orders. This crate holds the client entity and its validation
//! rules (no IO, no storage).

pub mod client;

pub use client::{Client, ClientUpdate, NewClient, validate_email};
