pub mod assets;
pub mod common;
pub mod config;
pub mod discovery;
pub mod duplicates;
pub mod errors;
pub mod identity;
pub mod input;
pub mod manifest;
pub mod migrate;
pub mod normalize;
pub mod orchestrator;
pub mod report;
pub mod sanitize;
pub mod store;
