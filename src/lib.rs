pub mod commands;
pub mod error;
pub mod fs;
pub mod git;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod plan;
pub mod validation;
