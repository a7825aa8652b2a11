use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;

use super::normalizer::{is_material, normalize, normalize_prose};
use crate::document::{Chapter, Document, Meta, Paragraph};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Invalid pattern: {0}")]
    Pattern(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Registered extractor formats, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractorFormat {
    GutenbergHtml,
}

impl ExtractorFormat {
    pub const ALL: &'static [Self] = &[Self::GutenbergHtml];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GutenbergHtml => "gutenberg",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::as_str).collect()
    }

    pub fn extractor(self) -> ExtractResult<Box<dyn Extractor>> {
        match self {
            Self::GutenbergHtml => Ok(Box::new(GutenbergHtmlExtractor::new()?)),
        }
    }
}

impl std::fmt::Display for ExtractorFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExtractorFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gutenberg" | "gutenberg_html" => Ok(Self::GutenbergHtml),
            _ => Err(crate::Error::UnsupportedFormat {
                name: s.to_string(),
                available: Self::names().join(", "),
            }),
        }
    }
}

/// Turns raw markup into a [`Document`].
pub trait Extractor: Send + Sync {
    fn format(&self) -> ExtractorFormat;

    fn compile(&self, markup: &[u8]) -> ExtractResult<Document>;

    /// Compile `input` and write the document as JSON to `output`.
    fn extract(&self, input: &Path, output: &Path) -> ExtractResult<Document> {
        let data = std::fs::read(input)?;
        let document = self.compile(&data)?;
        std::fs::write(output, document.to_json_pretty()?)?;
        Ok(document)
    }
}

const DC_TITLE: &str = "dc.title";
const DC_CREATOR: &str = "dc.creator";
const DC_LANGUAGE: &str = "dc.language";
const DC_SUBJECT: &str = "dc.subject";
const DC_RIGHTS: &str = "dc.rights";
const DCTERMS_SOURCE: &str = "dcterms.source";
const DCTERMS_MODIFIED: &str = "dcterms.modified";

const PUBLISHER: &str = "Urbana, Illinois: Project Gutenberg";
const MISSING: &str = "None";

/// Extractor for Project Gutenberg HTML books.
///
/// Chapters are `div.chapter` containers; paragraphs are the `p` elements
/// inside them. Title and author come from Dublin Core `meta` tags, falling
/// back to the top-level `h1`/`h2` of the body.
pub struct GutenbergHtmlExtractor {
    meta: Selector,
    title_heading: Selector,
    author_heading: Selector,
    chapter: Selector,
    chapter_heading: Selector,
    paragraph: Selector,
    author_names: Regex,
}

impl GutenbergHtmlExtractor {
    pub fn new() -> ExtractResult<Self> {
        Ok(Self {
            meta: selector("meta")?,
            title_heading: selector("body > h1")?,
            author_heading: selector("body > h2")?,
            chapter: selector("div.chapter")?,
            chapter_heading: selector("h2")?,
            paragraph: selector("p")?,
            author_names: Regex::new(r"(?:[A-Z][a-z'-]+\s?)+")
                .map_err(|e| ExtractError::Pattern(e.to_string()))?,
        })
    }

    fn fallback_title(&self, html: &Html) -> Option<String> {
        let heading = html.select(&self.title_heading).next()?;
        let title = normalize(&heading.text().collect::<String>());
        (!title.is_empty()).then_some(title)
    }

    fn fallback_authors(&self, html: &Html) -> Vec<String> {
        let Some(heading) = html.select(&self.author_heading).next() else {
            return Vec::new();
        };
        let text = heading.text().collect::<String>();
        self.author_names
            .find_iter(&text)
            .map(|m| m.as_str().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }

    fn chapters(&self, html: &Html) -> Vec<Chapter> {
        let mut chapters = Vec::new();
        let mut seq = 0u32;

        for (position, container) in html.select(&self.chapter).enumerate() {
            let raw_paragraphs: Vec<String> = container
                .select(&self.paragraph)
                .map(|p| p.text().collect::<String>())
                .collect();

            let text = normalize_prose(&raw_paragraphs.join(" "));
            if !is_material(&text) {
                tracing::debug!(position, "Dropping immaterial chapter container");
                continue;
            }

            seq += 1;
            let title = container
                .select(&self.chapter_heading)
                .next()
                .and_then(|h| chapter_title(&heading_text(h)));

            chapters.push(
                Chapter::new(title, seq, text).with_paragraphs(number_paragraphs(&raw_paragraphs)),
            );
        }

        chapters
    }
}

impl Extractor for GutenbergHtmlExtractor {
    fn format(&self) -> ExtractorFormat {
        ExtractorFormat::GutenbergHtml
    }

    fn compile(&self, markup: &[u8]) -> ExtractResult<Document> {
        let text = std::str::from_utf8(markup)
            .map_err(|e| ExtractError::MalformedInput(format!("not valid UTF-8: {e}")))?;
        let html = Html::parse_document(text);

        let tags = MetaTags::collect(&html, &self.meta);
        let title = tags.get(DC_TITLE);
        let creator = tags.get(DC_CREATOR);

        let citation = citation(
            tags.get(DC_RIGHTS).as_deref(),
            creator.as_deref(),
            title.as_deref(),
            tags.get(DCTERMS_MODIFIED).as_deref().and_then(retrieval_date).as_deref(),
            tags.get(DCTERMS_SOURCE).as_deref(),
        );

        let meta = Meta {
            language: tags.get(DC_LANGUAGE),
            subject: tags.get(DC_SUBJECT),
            citation,
        };

        let title = title.or_else(|| self.fallback_title(&html));
        let authors = creator.map_or_else(|| self.fallback_authors(&html), |c| vec![c]);

        let document = Document::new(title, authors, meta).with_chapters(self.chapters(&html));

        tracing::debug!(
            title = document.title.as_deref().unwrap_or(MISSING),
            chapters = document.chapters.len(),
            paragraphs = document.paragraph_count(),
            "Compiled document"
        );

        Ok(document)
    }
}

/// First-occurrence lookup over `<meta name=.. content=..>` annotations.
struct MetaTags(HashMap<String, Option<String>>);

impl MetaTags {
    fn collect(html: &Html, meta: &Selector) -> Self {
        let mut tags = HashMap::new();
        for element in html.select(meta) {
            if let Some(name) = element.value().attr("name") {
                tags.entry(name.to_string())
                    .or_insert_with(|| element.value().attr("content").map(String::from));
            }
        }
        Self(tags)
    }

    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned().flatten()
    }
}

fn selector(css: &str) -> ExtractResult<Selector> {
    Selector::parse(css).map_err(|e| ExtractError::Pattern(format!("{css}: {e}")))
}

/// Heading text with `<br>` rendered as a line break.
fn heading_text(heading: ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in heading.descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if e.name() == "br" => text.push('\n'),
            _ => {}
        }
    }
    text
}

/// Drop the leading chapter-number line and keep the line after it.
fn chapter_title(heading: &str) -> Option<String> {
    let (_, remainder) = heading.trim_start().split_once('\n')?;
    let line = remainder.trim_start().lines().next()?;
    let title = normalize(line);
    (!title.is_empty()).then_some(title)
}

fn number_paragraphs(raw: &[String]) -> Vec<Paragraph> {
    raw.iter()
        .map(|text| normalize_prose(text))
        .filter(|text| is_material(text))
        .zip(1u32..)
        .map(|(text, seq)| Paragraph::new(seq, text))
        .collect()
}

/// `YYYY-MM-DD...` to `Mon DD, YYYY`.
fn retrieval_date(modified: &str) -> Option<String> {
    let day: String = modified.chars().take(10).collect();
    NaiveDate::parse_from_str(&day, "%Y-%m-%d")
        .ok()
        .map(|date| date.format("%b %d, %Y").to_string())
}

fn citation(
    rights: Option<&str>,
    author: Option<&str>,
    title: Option<&str>,
    retrieved: Option<&str>,
    source: Option<&str>,
) -> String {
    format!(
        "{} {}. {}. {PUBLISHER}. Retrieved {} from {}",
        rights.unwrap_or(MISSING),
        author.unwrap_or(MISSING),
        title.unwrap_or(MISSING),
        retrieved.unwrap_or(MISSING),
        source.unwrap_or(MISSING),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(markup: &str) -> Document {
        GutenbergHtmlExtractor::new()
            .unwrap()
            .compile(markup.as_bytes())
            .unwrap()
    }

    const MOBY_DICK: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta name="dc.title" content="Moby-Dick">
  <meta name="dc.creator" content="Herman Melville">
  <meta name="dc.language" content="en">
  <meta name="dc.subject" content="Whaling -- Fiction">
  <meta name="dc.rights" content="Public domain">
  <meta name="dcterms.source" content="http://example">
  <meta name="dcterms.modified" content="2021-05-01T10:00:00+00:00">
</head>
<body>
  <h1>MOBY-DICK; or, THE WHALE.</h1>
  <h2>By Herman Melville</h2>
  <div class="chapter">
    <h2>CHAPTER 1.<br/>Loomings.</h2>
    <p>Call me Ishmael. Some years ago&mdash;never mind how long precisely&mdash;having
    little or no money in my purse,</p>
    <p>a</p>
  </div>
</body>
</html>"#;

    #[test]
    fn test_round_trip_scenario() {
        let doc = compile(MOBY_DICK);

        assert_eq!(doc.title.as_deref(), Some("Moby-Dick"));
        assert_eq!(doc.authors, vec!["Herman Melville".to_string()]);
        assert_eq!(doc.chapters.len(), 1);

        let chapter = &doc.chapters[0];
        assert_eq!(chapter.seq, 1);
        assert_eq!(chapter.title.as_deref(), Some("Loomings."));
        assert_eq!(chapter.paragraphs.len(), 1);
        assert_eq!(chapter.paragraphs[0].seq, 1);
        assert!(chapter.paragraphs[0].text.starts_with("Call me Ishmael."));
        assert!(!chapter.paragraphs[0].text.contains('\n'));
    }

    #[test]
    fn test_citation_scenario() {
        let doc = compile(MOBY_DICK);
        assert_eq!(
            doc.meta.citation,
            "Public domain Herman Melville. Moby-Dick. Urbana, Illinois: Project Gutenberg. \
             Retrieved May 01, 2021 from http://example"
        );
        assert_eq!(doc.meta.language.as_deref(), Some("en"));
        assert_eq!(doc.meta.subject.as_deref(), Some("Whaling -- Fiction"));
    }

    #[test]
    fn test_citation_with_missing_parts() {
        let doc = compile("<html><head><meta name=\"dc.title\" content=\"Emma\"></head><body></body></html>");
        assert_eq!(
            doc.meta.citation,
            "None None. Emma. Urbana, Illinois: Project Gutenberg. Retrieved None from None"
        );
        assert!(doc.meta.language.is_none());
    }

    #[test]
    fn test_unparseable_date_renders_missing() {
        assert_eq!(retrieval_date("2021-13-45"), None);
        assert_eq!(retrieval_date("soon"), None);
        assert_eq!(retrieval_date("2021-05-01").as_deref(), Some("May 01, 2021"));
    }

    #[test]
    fn test_heading_fallbacks() {
        let doc = compile(
            r"<html><body>
                <h1>Pride and Prejudice</h1>
                <h2>by Jane Austen</h2>
                <div><h1>Nested, ignored</h1></div>
              </body></html>",
        );

        assert_eq!(doc.title.as_deref(), Some("Pride and Prejudice"));
        assert_eq!(doc.authors, vec!["Jane Austen".to_string()]);
    }

    #[test]
    fn test_fallback_only_considers_body_children() {
        let doc = compile("<html><body><div><h1>Inside</h1><h2>Some One</h2></div></body></html>");
        assert!(doc.title.is_none());
        assert!(doc.authors.is_empty());
    }

    #[test]
    fn test_metadata_wins_over_headings() {
        let doc = compile(
            r#"<html><head><meta name="dc.title" content="Walden"></head>
               <body><h1>Something Else</h1></body></html>"#,
        );
        assert_eq!(doc.title.as_deref(), Some("Walden"));
    }

    #[test]
    fn test_fallback_author_splits_names() {
        let doc = compile("<html><body><h2>by Mary Shelley and Percy Bysshe Shelley</h2></body></html>");
        assert_eq!(
            doc.authors,
            vec!["Mary Shelley".to_string(), "Percy Bysshe Shelley".to_string()]
        );
    }

    #[test]
    fn test_chapter_contiguity_after_filtering() {
        let doc = compile(
            r#"<html><body>
                <div class="chapter"><h2>I<br>First</h2><p>One paragraph here.</p></div>
                <div class="chapter"><p> </p></div>
                <div class="chapter"><p>ab</p></div>
                <div class="chapter"><h2>III<br>Third</h2><p>Third chapter.</p><p>More.</p></div>
              </body></html>"#,
        );

        let seqs: Vec<u32> = doc.chapters.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(doc.chapters[1].title.as_deref(), Some("Third"));
    }

    #[test]
    fn test_three_character_chapter_is_kept() {
        let doc = compile(
            r#"<html><body>
                <div class="chapter"><p>ab</p></div>
                <div class="chapter"><p> abc </p></div>
              </body></html>"#,
        );

        assert_eq!(doc.chapters.len(), 1);
        assert_eq!(doc.chapters[0].seq, 1);
        assert_eq!(doc.chapters[0].text, "abc");
        assert_eq!(doc.chapters[0].paragraphs.len(), 1);
    }

    #[test]
    fn test_paragraph_contiguity_and_threshold() {
        let doc = compile(
            r#"<html><body><div class="chapter">
                <p>x</p><p>First kept.</p><p>  ab  </p><p>abc</p><p></p><p>Last kept.</p>
              </div></body></html>"#,
        );

        let paragraphs = &doc.chapters[0].paragraphs;
        let seqs: Vec<u32> = paragraphs.iter().map(|p| p.seq).collect();
        let texts: Vec<&str> = paragraphs.iter().map(|p| p.text.as_str()).collect();

        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(texts, vec!["First kept.", "abc", "Last kept."]);
    }

    #[test]
    fn test_chapter_text_joins_paragraphs() {
        let doc = compile(
            "<html><body><div class=\"chapter\"><p>\u{201C}Hello,\u{201D}</p><p>said\nhe.</p></div></body></html>",
        );
        assert_eq!(doc.chapters[0].text, "\"Hello,\" said he.");
    }

    #[test]
    fn test_chapter_title_rules() {
        assert_eq!(chapter_title("CHAPTER 1.\nLoomings."), Some("Loomings.".into()));
        assert_eq!(chapter_title("\n   CHAPTER 2.\n   The Carpet-Bag.\n"), Some("The Carpet-Bag.".into()));
        assert_eq!(chapter_title("CHAPTER 3. The Spouter-Inn."), None);
        assert_eq!(chapter_title("CHAPTER 4.\n   "), None);
    }

    #[test]
    fn test_chapter_without_heading() {
        let doc = compile("<html><body><div class=\"chapter\"><p>Untitled text.</p></div></body></html>");
        assert!(doc.chapters[0].title.is_none());
    }

    #[test]
    fn test_malformed_input() {
        let extractor = GutenbergHtmlExtractor::new().unwrap();
        let result = extractor.compile(&[0x3c, 0x68, 0xff, 0xfe]);
        assert!(matches!(result, Err(ExtractError::MalformedInput(_))));
    }

    #[test]
    fn test_deterministic_output() {
        let first = compile(MOBY_DICK).to_json_pretty().unwrap();
        let second = compile(MOBY_DICK).to_json_pretty().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_extract_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("moby.html");
        let output = dir.path().join("moby.json");
        std::fs::write(&input, MOBY_DICK).unwrap();

        let extractor = GutenbergHtmlExtractor::new().unwrap();
        let doc = extractor.extract(&input, &output).unwrap();

        let written = std::fs::read(&output).unwrap();
        assert_eq!(Document::from_json(&written).unwrap(), doc);
    }

    #[test]
    fn test_format_registry() {
        assert_eq!(
            "gutenberg".parse::<ExtractorFormat>().unwrap(),
            ExtractorFormat::GutenbergHtml
        );
        assert_eq!(
            "gutenberg_html".parse::<ExtractorFormat>().unwrap(),
            ExtractorFormat::GutenbergHtml
        );

        let err = "epub".parse::<ExtractorFormat>().unwrap_err();
        assert!(err.to_string().contains("gutenberg"));
    }
}
