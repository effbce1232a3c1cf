//! # Taskmill
//!
//! Task and entity tracking for coding agents. Every project directory gets
//! its own SQLite store; a shared registry remembers which workspaces exist.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! taskmill = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use taskmill::config::EngineConfig;
//! use taskmill::engine::Tracker;
//! use taskmill::types::{NewTask, Priority};
//!
//! let tracker = Tracker::open(EngineConfig::load(None)?)?;
//! let workspace = tracker.workspace(None)?;
//!
//! let task = workspace.create_task(NewTask {
//!     priority: Some(Priority::High),
//!     ..NewTask::new("Write the migration")
//! })?;
//! let ready = workspace.get_next_tasks()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the CLI module and binary. Disable with `default-features = false`.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod store;
pub mod types;
pub mod validation;
pub mod workspace;

pub use engine::{Tracker, Workspace};
pub use error::{Error, Result};
