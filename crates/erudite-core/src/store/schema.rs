use serde::{Deserialize, Serialize};

use crate::graph::{
    BOOK, CHAPTER, CHAPTERS_PROPERTY, CONTAINED_IN_PROPERTY, META, META_PROPERTY, PARAGRAPH,
    PARAGRAPHS_PROPERTY,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Text,
    TextArray,
    Int,
    /// Cross-reference to entries of the named class
    Reference(String),
}

impl PropertyKind {
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }

    /// Store data type name; references use the target class name.
    pub fn data_type(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::TextArray => "text[]",
            Self::Int => "int",
            Self::Reference(class) => class,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub name: String,
    pub kind: PropertyKind,
    pub description: Option<String>,
}

impl PropertySchema {
    fn new(name: &str, kind: PropertyKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: Some(description.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSchema {
    pub name: String,
    pub properties: Vec<PropertySchema>,
}

impl ClassSchema {
    pub fn primitive_properties(&self) -> impl Iterator<Item = &PropertySchema> {
        self.properties.iter().filter(|p| !p.kind.is_reference())
    }

    pub fn reference_properties(&self) -> impl Iterator<Item = &PropertySchema> {
        self.properties.iter().filter(|p| p.kind.is_reference())
    }

    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// A named set of store classes, selected by name on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    pub name: String,
    /// Class of the top-level entry of each loaded document
    pub root_class: String,
    pub classes: Vec<ClassSchema>,
}

impl StoreSchema {
    pub const NAMES: &'static [&'static str] = &["gutenberg"];

    /// Look up a registered schema.
    pub fn by_name(name: &str) -> crate::Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "gutenberg" => Ok(Self::gutenberg()),
            _ => Err(crate::Error::UnsupportedFormat {
                name: name.to_string(),
                available: Self::NAMES.join(", "),
            }),
        }
    }

    /// Book, Meta, Chapter and Paragraph, linked parent to child and back.
    #[must_use]
    pub fn gutenberg() -> Self {
        use PropertyKind::{Int, Reference, Text, TextArray};

        let book = ClassSchema {
            name: BOOK.to_string(),
            properties: vec![
                PropertySchema::new("title", Text, "The title of the book."),
                PropertySchema::new("author", TextArray, "The names of the authors."),
                PropertySchema::new(
                    META_PROPERTY,
                    Reference(META.to_string()),
                    "Metadata on the origin, language and subject of the book.",
                ),
                PropertySchema::new(
                    CHAPTERS_PROPERTY,
                    Reference(CHAPTER.to_string()),
                    "The chapters of the book.",
                ),
            ],
        };

        let meta = ClassSchema {
            name: META.to_string(),
            properties: vec![
                PropertySchema::new("language", Text, "The language of the book."),
                PropertySchema::new("subject", Text, "The subject of the book."),
                PropertySchema::new("citation", Text, "Project Gutenberg citation."),
                PropertySchema::new(
                    CONTAINED_IN_PROPERTY,
                    Reference(BOOK.to_string()),
                    "The Book that contains this Meta.",
                ),
            ],
        };

        let chapter = ClassSchema {
            name: CHAPTER.to_string(),
            properties: vec![
                PropertySchema::new("title", Text, "(Optional) The name of the chapter."),
                PropertySchema::new("seq", Int, "The position of this chapter within the book."),
                PropertySchema::new("text", Text, "The text of the whole chapter."),
                PropertySchema::new(
                    PARAGRAPHS_PROPERTY,
                    Reference(PARAGRAPH.to_string()),
                    "The paragraphs under the chapter.",
                ),
                PropertySchema::new(
                    CONTAINED_IN_PROPERTY,
                    Reference(BOOK.to_string()),
                    "The Book that contains this Chapter.",
                ),
            ],
        };

        let paragraph = ClassSchema {
            name: PARAGRAPH.to_string(),
            properties: vec![
                PropertySchema::new("seq", Int, "The position of this paragraph within the chapter."),
                PropertySchema::new("text", Text, "The text of the paragraph."),
                PropertySchema::new(
                    CONTAINED_IN_PROPERTY,
                    Reference(CHAPTER.to_string()),
                    "The Chapter that contains this paragraph.",
                ),
            ],
        };

        Self {
            name: "gutenberg".to_string(),
            root_class: BOOK.to_string(),
            classes: vec![book, meta, chapter, paragraph],
        }
    }

    pub fn class(&self, name: &str) -> Option<&ClassSchema> {
        self.classes.iter().find(|c| c.name == name)
    }
}
