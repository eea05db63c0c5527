//! Stream Advisor: academic stream recommendation after 10th grade.

pub mod advisor;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod stream;
