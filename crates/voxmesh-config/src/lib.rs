//! Configuration for the voxmesh meshing pipeline.
//!
//! Settings persist to disk as RON files, can be overridden from the command
//! line via clap, and support hot-reload detection.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, FocusConfig, LodConfig, MeshingConfig, TelemetryConfig,
    default_config_dir,
};
pub use error::ConfigError;
