pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod navigator;
pub mod resolve;
pub mod syntax;
pub mod util;
