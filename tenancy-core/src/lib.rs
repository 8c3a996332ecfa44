//! # Tenancy Core
//!
//! Tenant lifecycle orchestration for a shared, multi-tenant resource
//! inventory. The crate reconciles an external project datamodel against the
//! inventory: it provisions baseline resources when a project appears and
//! performs an ordered, multi-kind teardown when the project goes away.
//!
//! ## Architecture
//!
//! - [`reconcile`]: two keyed reconcile loops (creation, termination) fed by
//!   project signals, each with its own backoff policy.
//! - [`initialization`]: idempotent provisioning of baseline resources and the
//!   tenant record, plus the event handler acknowledging tenant creation.
//! - [`termination`]: the per-tenant termination chain, its strategies, the
//!   event-driven wait primitive and the single-terminator registry.
//! - [`events`]: fan-out of inventory change events to registered handlers.
//! - [`inventory`] and [`datamodel`]: the external collaborators, each behind
//!   a trait with an in-memory implementation.
//! - [`scope`], [`retry`], [`promise`] and [`cache`]: the small primitives the
//!   controllers are built from.
//!
//! Every collaborator is passed in explicitly; the crate holds no global
//! state. Orchestration state itself is never persisted and is rebuilt from
//! the inventory and the datamodel on each attempt.
#![allow(missing_docs)]

pub mod cache;
pub mod config;
pub mod datamodel;
pub mod error;
pub mod events;
pub mod initialization;
pub mod inventory;
pub mod promise;
pub mod reconcile;
pub mod retry;
pub mod scope;
pub mod termination;

pub use config::{
    ControllerConfig, InitializationConfig, ReconcilerConfig, RetryConfig, TerminationConfig,
};
pub use error::{ErrorCode, Result, TenancyError};
pub use events::{EventDispatcher, EventHandler};
pub use scope::Scope;
