//! Docker Engine Client Library
//!
//! A synchronous client for the Docker Engine API covering the image and
//! container operations needed to build and run images: pull, push, load,
//! export, inspect, tag and remove images; create, start, follow, wait for
//! and remove containers; delete volumes.
//!
//! Long running calls report their progress through
//! [`UpdateListener`](update::UpdateListener)s.

pub mod api;
pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod export;
pub mod json_stream;
pub mod logging;
pub mod tar_archive;
pub mod transport;
pub mod types;
pub mod update;

pub use api::DockerApi;
pub use config::{DockerHostConfig, RegistryAuth};
pub use error::{DockerError, Result};
pub use logging::Logger;
