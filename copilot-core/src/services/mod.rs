pub mod backend;
pub mod batch;
pub mod catalog;
pub mod encoding;
pub mod engine;
pub mod export;
pub mod merge;
pub mod settings;
pub mod snapshot;

#[cfg(test)]
pub mod mock;
