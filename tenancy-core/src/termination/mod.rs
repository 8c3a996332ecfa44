//! Ordered per-tenant teardown.
//!
//! A [`TerminationController`] owns the shared [`TerminationChain`] and a
//! [`TerminatorRegistry`]. Each call to `terminate_tenant` claims the tenant
//! in the registry, builds a [`TenantTerminator`] with its own event inbox and
//! walks the chain step by step. Steps that wait for owning resource managers
//! to converge use [`wait_until`], which is driven by inventory events and a
//! periodic tick.

mod chain;
mod controller;
mod registry;
pub mod strategies;
mod terminator;
mod wait;

pub use chain::{
    ExecutionStatus, StepContext, TerminationChain, TerminationStep, TerminationStrategy,
    production_chain,
};
pub use controller::TerminationController;
pub use registry::{RegistrationGuard, TerminatorHandle, TerminatorRegistry};
pub use terminator::TenantTerminator;
pub use wait::{EventFilter, EventInbox, wait_until};
