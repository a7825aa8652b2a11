//! Nested [`Document`] to flat entries and references.
//!
//! Construction is two-phase: every entry is built first, then the full
//! reference set is computed in one pass and attached to its endpoints.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use super::entry::{Entry, EntryRef, FlatGraph, GraphResult, Reference};
use crate::document::Document;

pub const BOOK: &str = "Book";
pub const META: &str = "Meta";
pub const CHAPTER: &str = "Chapter";
pub const PARAGRAPH: &str = "Paragraph";

pub const META_PROPERTY: &str = "meta";
pub const CHAPTERS_PROPERTY: &str = "chapters";
pub const PARAGRAPHS_PROPERTY: &str = "paragraphs";
pub const CONTAINED_IN_PROPERTY: &str = "containedIn";

/// Parent/child pair by position in the entry list.
struct Containment {
    parent: usize,
    child: usize,
    property: &'static str,
}

/// Entries keyed by identity; content seen twice maps to one position.
#[derive(Default)]
struct EntrySet {
    entries: Vec<Entry>,
    positions: HashMap<EntryRef, usize>,
    containments: Vec<Containment>,
    seen: HashSet<(usize, usize, &'static str)>,
}

impl EntrySet {
    fn insert(&mut self, entry: Entry) -> usize {
        let next = self.entries.len();
        let position = *self.positions.entry(entry.key()).or_insert(next);
        if position == next {
            self.entries.push(entry);
        }
        position
    }

    fn contain(&mut self, parent: usize, child: usize, property: &'static str) {
        if self.seen.insert((parent, child, property)) {
            self.containments.push(Containment {
                parent,
                child,
                property,
            });
        }
    }
}

/// Flatten `document` with `root_class` as the class of the book entry.
///
/// Entries come out as `[Book, Meta, chapters.., paragraphs..]`, paragraphs
/// grouped by chapter. Each containment is one bidirectional reference,
/// `parent.<property> <-> child.containedIn`.
///
/// Entries with the same identity are merged: a paragraph whose `seq` and
/// text repeat in two chapters is one entry contained in both.
pub fn flatten(document: &Document, root_class: &str) -> GraphResult<FlatGraph> {
    let EntrySet {
        mut entries,
        containments,
        ..
    } = build_entries(document, root_class);

    let mut references = Vec::with_capacity(containments.len());
    for link in containments {
        let reference = Reference::new(entries[link.parent].key(), entries[link.child].key(), link.property)
            .with_child_property(CONTAINED_IN_PROPERTY);

        entries[link.parent].attach(reference.clone())?;
        entries[link.child].attach(reference.clone())?;
        references.push(reference);
    }

    let graph = FlatGraph { entries, references };
    graph.validate()?;

    tracing::debug!(
        root_class,
        entries = graph.entries.len(),
        references = graph.references.len(),
        "Flattened document"
    );

    Ok(graph)
}

fn build_entries(document: &Document, root_class: &str) -> EntrySet {
    let mut set = EntrySet {
        entries: Vec::with_capacity(2 + document.chapters.len() + document.paragraph_count()),
        ..Default::default()
    };

    let book = set.insert(Entry::new(
        root_class,
        fields([
            ("title", optional(document.title.as_deref())),
            ("author", Value::from(document.authors.clone())),
        ]),
    ));

    let meta = set.insert(Entry::new(
        META,
        fields([
            ("language", optional(document.meta.language.as_deref())),
            ("subject", optional(document.meta.subject.as_deref())),
            ("citation", Value::from(document.meta.citation.as_str())),
        ]),
    ));
    set.contain(book, meta, META_PROPERTY);

    let mut chapters = Vec::with_capacity(document.chapters.len());
    for chapter in &document.chapters {
        let position = set.insert(Entry::new(
            CHAPTER,
            fields([
                ("title", optional(chapter.title.as_deref())),
                ("seq", Value::from(chapter.seq)),
                ("text", Value::from(chapter.text.as_str())),
            ]),
        ));
        set.contain(book, position, CHAPTERS_PROPERTY);
        chapters.push(position);
    }

    for (chapter, &parent) in document.chapters.iter().zip(&chapters) {
        for paragraph in &chapter.paragraphs {
            let position = set.insert(Entry::new(
                PARAGRAPH,
                fields([
                    ("seq", Value::from(paragraph.seq)),
                    ("text", Value::from(paragraph.text.as_str())),
                ]),
            ));
            set.contain(parent, position, PARAGRAPHS_PROPERTY);
        }
    }

    set
}

fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn optional(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}
