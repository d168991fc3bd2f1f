// Library exports for skillswap
// The binary and integration tests build on these modules

pub mod cascade;
pub mod chat;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod identity;
pub mod integrity;
pub mod matching;
pub mod models;
pub mod notify;
pub mod posts;
pub mod reviews;
pub mod store;
pub mod users;

#[cfg(test)]
mod testing;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
