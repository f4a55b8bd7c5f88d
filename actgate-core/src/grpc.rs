//! # Generic gRPC Transport
//!
//! This module contains the low-level building blocks for performing unary gRPC calls with
//! message types that only exist at runtime.
//!
//! Unlike standard `tonic` clients, which are strongly typed (e.g., `HelloRequest`), everything
//! here moves [`prost_reflect::DynamicMessage`] values whose layout is driven by a descriptor.
pub mod client;
pub mod codec;
pub mod connector;
