//! Relational query gateway over document stores.
//!
//! Sessions accept MySQL command packets through a [`connection::Connection`],
//! classify the SQL, discover table layouts lazily from the backend and answer
//! with relational result sets.
//!
//! Only the first statement of a multi-statement query is executed. The rest
//! is logged and ignored.
pub mod backend;
pub mod classify;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod materialize;
pub mod parser;
pub mod registry;
pub mod result;
pub mod schema;
pub mod session;
pub mod types;

#[cfg(test)]
mod testutil;
