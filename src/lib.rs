//! Host configuration engine.
//!
//! Deploys a fixed catalog of configuration files (kernel command line,
//! module options, systemd drop-ins, network backend, session environment)
//! atomically, shows how installed files drift from it, and verifies both
//! the persisted files and the running system against it.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]** — compiled defaults plus an optional TOML overlay
//! - **[`catalog`]** — destination → renderer mapping and its lint
//! - **[`resources`]** — atomic, symlink-safe install and removal
//! - **[`diff`]** and **[`verify`]** — read-only comparison and checks
//! - **[`tasks`]** — named, ordered deploy and uninstall steps
//! - **[`commands`]** — top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod catalog;
pub mod cleanup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod diff;
pub mod error;
pub mod exec;
pub mod lock;
pub mod logging;
pub mod platform;
pub mod resources;
pub mod sudo;
pub mod tasks;
pub mod verify;
