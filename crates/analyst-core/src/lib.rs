pub mod artifact;
pub mod catalog;
pub mod config;
pub mod digest;
pub mod error;
pub mod harness;
pub mod io;
pub mod paths;
pub mod prompt;
pub mod report;
pub mod resolver;
pub mod sandbox;
pub mod sanitize;
pub mod selector;
pub mod signals;
pub mod types;
pub mod validate;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use error::{AnalystError, Result};
pub use tokio_util::sync::CancellationToken;
