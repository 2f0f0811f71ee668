//! Core types, algorithms and trait definitions for the Data4Help query
//! feasibility and consent engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::QueryStore`]; mail transports
//! implement [`notify::Notifier`]; [`engine::Engine`] ties them together.

pub mod account;
pub mod anonymize;
pub mod cohort;
pub mod consent;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod notify;
pub mod query;
pub mod sample;
pub mod store;

pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
