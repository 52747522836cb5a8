//! bos-artifacts - content-addressed build artifacts and provenance
//!
//! Hashes build outputs and configurations, packages outputs into
//! deterministic archives, publishes them to a sharded binary mirror,
//! mirrors upstream sources, and stamps provenance into finished outputs.

pub mod archive;
pub mod audit;
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod fetch;
pub mod fsutil;
pub mod hash;
pub mod identity;
pub mod mirror;
pub mod provenance;
pub mod ui;

pub use error::{ArtifactError, ArtifactResult};
