pub mod common;
pub mod plan;
pub mod run;
pub mod status;
pub mod sweep;
