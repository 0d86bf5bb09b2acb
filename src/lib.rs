pub mod aggregate;
pub mod analyzer;
pub mod cluster;
pub mod collector;
pub mod config;
pub mod dispatch;
pub mod enrich;
pub mod error;
pub mod executor;
pub mod glob;
pub mod mutants;
pub mod output;
pub mod packager;
pub mod partition;
pub mod project;
pub mod state;
pub mod synth;
