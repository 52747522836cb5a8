//! CLI command implementations

pub mod completions;
pub mod config;
pub mod fetch;
pub mod hash;
pub mod identity;
pub mod install;
pub mod package;
pub mod publish;
pub mod query;
pub mod stamp;

pub use completions::execute as completions;
pub use config::execute as config;
pub use fetch::{fetch_sources, verify_mirror};
pub use hash::execute as hash;
pub use identity::execute as config_hash;
pub use install::execute as install;
pub use package::execute as package;
pub use publish::execute as publish;
pub use query::execute as query;
pub use stamp::{stamp, verify};
