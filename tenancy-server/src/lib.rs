//! # Tenancy Server
//!
//! Process wiring for the tenant lifecycle controller.
//!
//! - [`infra::config`]: layered configuration (TOML file, `.env`, environment
//!   overrides) with guard rails.
//! - [`infra::control_plane`]: construction of every controller through
//!   explicit dependency injection, and the supervised run loop.

pub mod infra;
