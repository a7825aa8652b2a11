//! Long-form HTML books to a nested document model, and from there to a flat
//! graph of content-addressed entries loaded into a vector store.

pub mod document;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod load;
pub mod store;

pub use document::{Chapter, Document, Meta, Paragraph};
pub use error::{Error, Result};
pub use graph::{flatten, Entry, EntryId, EntryRef, FlatGraph, Reference};
pub use ingest::{ExtractJob, ExtractReport, Extractor, ExtractorFormat, GutenbergHtmlExtractor};
pub use load::{LoadJob, LoadReport, Loader, LoaderFormat};
pub use store::{
    BatchEmitter, EmitReport, StoreConfig, StoreConnector, StoreError, StoreSchema, WeaviateClient,
};
