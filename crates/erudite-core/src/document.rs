use serde::{Deserialize, Deserializer, Serialize};

/// A book extracted from markup: the nested model before flattening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: Option<String>,
    #[serde(rename = "author", default, deserialize_with = "deserialize_authors")]
    pub authors: Vec<String>,
    pub meta: Meta,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub language: Option<String>,
    pub subject: Option<String>,
    pub citation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: Option<String>,
    pub seq: u32,
    pub text: String,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub seq: u32,
    pub text: String,
}

impl Document {
    #[must_use]
    pub fn new(title: Option<String>, authors: Vec<String>, meta: Meta) -> Self {
        Self {
            title,
            authors,
            meta,
            chapters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_chapters(mut self, chapters: Vec<Chapter>) -> Self {
        self.chapters = chapters;
        self
    }

    pub fn paragraph_count(&self) -> usize {
        self.chapters.iter().map(|c| c.paragraphs.len()).sum()
    }

    /// Pretty JSON with four-space indentation.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        // serde_json only ever writes valid UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}

impl Chapter {
    #[must_use]
    pub fn new(title: Option<String>, seq: u32, text: String) -> Self {
        Self {
            title,
            seq,
            text,
            paragraphs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_paragraphs(mut self, paragraphs: Vec<Paragraph>) -> Self {
        self.paragraphs = paragraphs;
        self
    }
}

impl Paragraph {
    #[must_use]
    pub fn new(seq: u32, text: String) -> Self {
        Self { seq, text }
    }
}

/// Older exports wrote `author` as a bare string or `null`.
fn deserialize_authors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Authors {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Authors>::deserialize(deserializer)? {
        Some(Authors::One(author)) => vec![author],
        Some(Authors::Many(authors)) => authors,
        None => Vec::new(),
    })
}
