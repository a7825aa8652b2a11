mod entry;
mod flatten;
mod identity;

pub use entry::{Entry, EntryRef, FlatGraph, GraphError, GraphResult, Reference};
pub use flatten::{
    flatten, BOOK, CHAPTER, CHAPTERS_PROPERTY, CONTAINED_IN_PROPERTY, META, META_PROPERTY,
    PARAGRAPH, PARAGRAPHS_PROPERTY,
};
pub use identity::{assign, canonical_json, EntryId};
