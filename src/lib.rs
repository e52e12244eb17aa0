pub mod analysis;
pub mod config;
pub mod document;
pub mod error;
pub mod generation;
pub mod heuristics;
pub mod metrics;
pub mod report;
pub mod table;

pub use error::{Error, Result};
