//! # Dynamic Schema Engine
//!
//! Everything needed to go from "schema sources of a producing component" to a queryable set of
//! descriptors:
//!
//! 1. [`source`]: raw `.proto` files as delivered by the upstream provider.
//! 2. [`compiler`]: `protoc` driven compilation into descriptors and JSON-Schema documents.
//! 3. [`graph`]: assembly of one main file and its dependencies into a [`graph::DescriptorGraph`].
//! 4. [`registry`]: every graph of a component, indexed by [`ServiceKey`].
//! 5. [`cache`]: the bounded, expiring cache of those registries.
pub mod cache;
pub mod compiler;
pub mod graph;
pub mod json_schema;
pub mod registry;
pub mod source;
mod types;

pub use types::*;
