//! Domain models for Warden.
//!
//! These are the core types shared across all crates.

pub mod group;
pub mod permission;
pub mod principal;
pub mod record;
pub mod role;
