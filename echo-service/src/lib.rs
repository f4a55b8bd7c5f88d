//! # Echo Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide a dynamic gRPC server and a set of
//! hand-built schema descriptors for integration testing `actgate_core`.
//! It is not intended for production use.
pub mod fixtures;
mod server;

pub use server::{Behavior, EchoServer};
