//! Armada-Jupyter - run Jupyter notebooks as Armada batch jobs
//!
//! Reads a YAML submission file, translates every entry into an Armada job
//! submit request (pod spec, ingress, labels), submits the batch and watches
//! the job set until each notebook is reachable.
//!
//! # Modules
//!
//! - [`document`] - Submission file layouts (current and legacy schema)
//! - [`resources`] - CPU/memory/accelerator options for a notebook pod
//! - [`podspec`] - Kubernetes pod spec types sent to Armada
//! - [`timeout`] - Timeout strings (`30s`, `10m`, `1h`)
//! - [`armada`] - Armada API types and client
//! - [`submit`] - Submit and watch driver
//! - [`config`] - Defaults and client settings
//! - [`cli`] - Command line interface
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod armada;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod podspec;
pub mod resources;
pub mod submit;
pub mod timeout;
mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Notebook Constants
// =============================================================================

/// Port JupyterLab listens on inside the notebook container
pub const JUPYTER_PORT: u32 = 8888;

/// UID the notebook container runs as (the jovyan user in Jupyter images)
pub const NOTEBOOK_USER_ID: i64 = 1000;

/// GID the notebook container runs as
pub const NOTEBOOK_GROUP_ID: i64 = 100;
