//! # Repository Layer
//!
//! SeaORM access for users and their connections. Repositories hold the
//! shared pool and return [`crate::error::RepositoryError`].

pub mod connection;
pub mod user;

pub use connection::ConnectionRepository;
pub use user::UserRepository;
