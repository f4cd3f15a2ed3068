//! Command-line surface for assembling and checking the Beacon stack.
//!
//! This crate owns config loading, logging and the AWS lookups used by
//! `preflight`. Descriptor semantics stay in `beacon_stack_core`.

pub mod adapters;
pub mod commands;
pub mod config;
pub mod logging;
pub mod preflight;
