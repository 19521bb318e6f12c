//! Warden Core: domain models, error taxonomy and repository traits
//! shared by the authorization engine and its storage backends.

pub mod error;
pub mod models;
pub mod repository;
