//! # Rolodink API Library
//!
//! Backend for the Rolodink LinkedIn extension: authentication through
//! Supabase, per-user connection notes, account export and erasure, and
//! the extension update check.

pub mod auth;
pub mod config;
pub mod cors;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod rate_limit;
pub mod repositories;
pub mod server;
pub mod supabase;
pub mod telemetry;
pub mod version;
pub use migration;
