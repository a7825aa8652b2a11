//! The store boundary: configuration, the connector contract, the Weaviate
//! HTTP connector, schema definitions and the batch emitter.

mod client;
mod config;
mod connector;
mod emitter;
mod schema;

pub use client::WeaviateClient;
pub use config::{StoreConfig, StoreConfigError, API_KEY_ENV, CONCURRENCY_ENV, MAX_RETRIES_ENV};
pub use connector::{MemoryStore, StoreConnector, StoreError, StoreResult, StoredLink};
pub use emitter::{BatchEmitter, EmitError, EmitReport, EmitResult, FailedEntry, FailedLink};
pub use schema::{ClassSchema, PropertyKind, PropertySchema, StoreSchema};
