//! Core translation pipeline

pub mod auth;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod errors;
pub mod history;
pub mod languages;
pub mod ledger;
pub mod models;
#[cfg(feature = "mongodb")]
pub mod mongo_store;
pub mod preferences;
pub mod rate_limiter;
pub mod translator;

#[cfg(test)]
pub(crate) mod testing;
