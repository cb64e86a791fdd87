//! Container workspace provisioning engine.
//!
//! Reads a declarative manifest of source → target mappings and copies each
//! source from the host into a container volume, then applies the entry's
//! flags: stripping host-only keys from copied git configuration (`g`) and
//! hardening secret paths to owner-only access (`s`, recursively with `d`).
//!
//! The public API is organised into four layers:
//!
//! - **[`config`]**: settings, the manifest format, and the settings key editor
//! - **[`resources`]**: idempotent `check + apply` primitives (transfer, git filter, secret)
//! - **[`tasks`]**: the ordered units of a run, wired to resources
//! - **[`commands`]**: subcommand orchestration (`provision`, `harden`, `manifest`, `config`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod operations;
pub mod paths;
pub mod platform;
pub mod resources;
pub mod tasks;
pub mod volume;
