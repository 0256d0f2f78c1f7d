pub mod engine;
pub mod execution;
pub mod icon;
pub mod models;
pub mod registry;
pub mod repofile;
pub mod sanitize;
pub mod sources;
pub mod workers;
