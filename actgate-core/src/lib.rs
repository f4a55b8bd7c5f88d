//! # Actgate Core
//!
//! `actgate-core` is the engine behind the Actgate gateway. It lets a caller invoke a unary gRPC
//! method on a remote component whose Protobuf schema is not known at build time: the schema
//! arrives at runtime as a bundle of `.proto` sources, is compiled into binary descriptors,
//! cached, and used to translate between JSON and the wire format on demand.
//!
//! ## Key Components
//!
//! * **[`schema::compiler`]:** Shells out to `protoc` to turn schema sources into descriptor sets
//!   and JSON-Schema documents, resolving imports depth-first.
//! * **[`schema::graph::DescriptorGraph`]:** The assembled, queryable descriptor graph for one
//!   main file, with JSON <-> `DynamicMessage` conversion bound to it.
//! * **[`schema::registry::DependentSchemaBundle`]:** Every graph belonging to one producing
//!   component, indexed by [`schema::ServiceKey`].
//! * **[`schema::cache::SchemaCache`]:** A TTL and capacity bounded cache of bundles. A miss
//!   fetches, compiles and assembles; a hit does no I/O.
//! * **[`invoker::DynamicInvoker`]:** Resolves a method, builds the request message, opens a
//!   transient connection and performs a single unary call under a deadline.
//!
//! ## External collaborators
//!
//! Fetching schema sources ([`provider::SchemaSourceProvider`]), resolving endpoints
//! ([`directory::EndpointDirectory`]), opening connections ([`grpc::connector::Connector`]) and
//! publishing call records ([`invoker::events::EventSink`]) are traits, so every piece can be
//! swapped for an in-process implementation in tests.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod directory;
pub mod error;
pub mod grpc;
pub mod invoker;
pub mod provider;
pub mod schema;
pub mod settings;

pub use error::ErrorKind;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
