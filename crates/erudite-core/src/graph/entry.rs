use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::identity::{assign, EntryId};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Invalid reference: {reference} does not involve {owner}")]
    InvalidReference { owner: EntryRef, reference: String },
    #[error("Reference endpoint not in graph: {0}")]
    DanglingReference(EntryRef),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Address of an entry in the store: its class and id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryRef {
    pub class_name: String,
    pub id: EntryId,
}

impl std::fmt::Display for EntryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.class_name, self.id)
    }
}

/// A named link from `parent` to `child`.
///
/// With `on_child_property` set the link is bidirectional and the child links
/// back to the parent through that property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub parent: EntryRef,
    pub child: EntryRef,
    pub on_parent_property: String,
    pub on_child_property: Option<String>,
}

impl Reference {
    #[must_use]
    pub fn new(parent: EntryRef, child: EntryRef, on_parent_property: impl Into<String>) -> Self {
        Self {
            parent,
            child,
            on_parent_property: on_parent_property.into(),
            on_child_property: None,
        }
    }

    #[must_use]
    pub fn with_child_property(mut self, property: impl Into<String>) -> Self {
        self.on_child_property = Some(property.into());
        self
    }

    pub const fn is_bidirectional(&self) -> bool {
        self.on_child_property.is_some()
    }

    pub fn involves(&self, entry: &EntryRef) -> bool {
        &self.parent == entry || &self.child == entry
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} -> {}", self.parent, self.on_parent_property, self.child)?;
        if let Some(ref back) = self.on_child_property {
            write!(f, " ({back})")?;
        }
        Ok(())
    }
}

/// A flat record destined for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub class_name: String,
    pub data: Map<String, Value>,
    pub id: EntryId,
    references: Vec<Reference>,
}

impl Entry {
    /// Build an entry; the id is derived from `class_name` and `data`.
    #[must_use]
    pub fn new(class_name: impl Into<String>, data: Map<String, Value>) -> Self {
        let class_name = class_name.into();
        let id = assign(&class_name, &data);
        Self {
            class_name,
            data,
            id,
            references: Vec::new(),
        }
    }

    pub fn key(&self) -> EntryRef {
        EntryRef {
            class_name: self.class_name.clone(),
            id: self.id,
        }
    }

    /// Attach a reference this entry takes part in. Repeats are ignored.
    pub fn attach(&mut self, reference: Reference) -> GraphResult<()> {
        let key = self.key();
        if !reference.involves(&key) {
            return Err(GraphError::InvalidReference {
                owner: key,
                reference: reference.to_string(),
            });
        }
        if !self.references.contains(&reference) {
            self.references.push(reference);
        }
        Ok(())
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn has_references(&self) -> bool {
        !self.references.is_empty()
    }
}

/// The flattened document: entries parent-first, plus every reference once.
#[derive(Debug, Clone, Default)]
pub struct FlatGraph {
    pub entries: Vec<Entry>,
    pub references: Vec<Reference>,
}

impl FlatGraph {
    pub fn entry(&self, key: &EntryRef) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.id == key.id && e.class_name == key.class_name)
    }

    pub fn entries_of<'a>(&'a self, class_name: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries.iter().filter(move |e| e.class_name == class_name)
    }

    /// Check that every reference is held by its endpoints.
    ///
    /// The parent always holds it; the child holds it too when it is
    /// bidirectional. When several entries share a key, any one of them
    /// holding the reference is enough.
    pub fn validate(&self) -> GraphResult<()> {
        let mut index: HashMap<EntryRef, Vec<&Entry>> = HashMap::new();
        for entry in &self.entries {
            index.entry(entry.key()).or_default().push(entry);
        }

        for reference in &self.references {
            let parent = index
                .get(&reference.parent)
                .ok_or_else(|| GraphError::DanglingReference(reference.parent.clone()))?;
            let child = index
                .get(&reference.child)
                .ok_or_else(|| GraphError::DanglingReference(reference.child.clone()))?;

            let mut holders = vec![(&reference.parent, parent)];
            if reference.is_bidirectional() {
                holders.push((&reference.child, child));
            }
            for (key, candidates) in holders {
                if !candidates.iter().any(|e| e.references.contains(reference)) {
                    return Err(GraphError::InvalidReference {
                        owner: key.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
        }

        for entry in &self.entries {
            let key = entry.key();
            if let Some(stray) = entry.references.iter().find(|r| !r.involves(&key)) {
                return Err(GraphError::InvalidReference {
                    owner: key,
                    reference: stray.to_string(),
                });
            }
        }

        Ok(())
    }
}
