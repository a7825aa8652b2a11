//! Loading extracted JSON documents into a store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::document::Document;
use crate::graph::{flatten, FlatGraph, GraphError};
use crate::store::{BatchEmitter, EmitReport, StoreConfig, StoreConnector, StoreSchema};
use crate::{Error, Result};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Invalid document {}: {message}", path.display())]
    InvalidDocument { path: PathBuf, message: String },
    #[error("Invalid graph: {0}")]
    Graph(#[from] GraphError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderFormat {
    Gutenberg,
}

impl LoaderFormat {
    pub const ALL: &'static [Self] = &[Self::Gutenberg];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gutenberg => "gutenberg",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::as_str).collect()
    }

    /// A loader whose top-level entries get class `root_class`.
    pub fn loader(self, root_class: &str) -> Box<dyn Loader> {
        match self {
            Self::Gutenberg => Box::new(GutenbergLoader::new(root_class)),
        }
    }
}

impl std::fmt::Display for LoaderFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoaderFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gutenberg" => Ok(Self::Gutenberg),
            _ => Err(Error::UnsupportedFormat {
                name: s.to_string(),
                available: Self::names().join(", "),
            }),
        }
    }
}

/// Turns one serialized document into a graph ready to emit.
pub trait Loader: Send + Sync {
    fn format(&self) -> LoaderFormat;

    fn compile(&self, json: &[u8]) -> LoadResult<FlatGraph>;
}

/// Reads the JSON written by the Gutenberg extractor.
pub struct GutenbergLoader {
    root_class: String,
}

impl GutenbergLoader {
    pub fn new(root_class: impl Into<String>) -> Self {
        Self {
            root_class: root_class.into(),
        }
    }
}

impl Loader for GutenbergLoader {
    fn format(&self) -> LoaderFormat {
        LoaderFormat::Gutenberg
    }

    fn compile(&self, json: &[u8]) -> LoadResult<FlatGraph> {
        let document = Document::from_json(json).map_err(|e| LoadError::InvalidDocument {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        Ok(flatten(&document, &self.root_class)?)
    }
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub entries: usize,
    pub report: EmitReport,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub documents: Vec<LoadedDocument>,
    pub total: EmitReport,
    pub duration_ms: u64,
}

/// Load run over one JSON file or a directory of them.
pub struct LoadJob {
    input: PathBuf,
    format: LoaderFormat,
    schema: StoreSchema,
}

impl LoadJob {
    pub fn new(input: impl Into<PathBuf>, format: LoaderFormat, schema: StoreSchema) -> Self {
        Self {
            input: input.into(),
            format,
            schema,
        }
    }

    /// Check the store, make sure the schema exists, then emit every document
    /// in file-name order.
    pub async fn run(&self, connector: Arc<dyn StoreConnector>, config: &StoreConfig) -> Result<LoadReport> {
        let start = std::time::Instant::now();
        let inputs = self.collect_inputs().await?;

        connector.ping().await.map_err(|e| {
            tracing::error!(error = %e, "Store is not reachable");
            Error::Store(e)
        })?;
        connector.ensure_schema(&self.schema).await?;

        tracing::info!(
            input = %self.input.display(),
            format = %self.format,
            schema = %self.schema.name,
            documents = inputs.len(),
            "Starting load"
        );

        let loader = self.format.loader(&self.schema.root_class);
        let emitter = BatchEmitter::new(connector, config);
        let mut report = LoadReport::default();

        for path in inputs {
            let graph = compile_file(loader.as_ref(), &path).await?;
            let entries = graph.entries.len();

            let emitted = emitter.emit(&graph).await?;
            tracing::info!(
                path = %path.display(),
                entries,
                upserted = emitted.upserted,
                failed = emitted.failed.len(),
                "Loaded"
            );

            report.total.merge(emitted.clone());
            report.documents.push(LoadedDocument {
                path,
                entries,
                report: emitted,
            });
        }

        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(report)
    }

    async fn collect_inputs(&self) -> Result<Vec<PathBuf>> {
        let metadata = tokio::fs::metadata(&self.input).await.map_err(LoadError::Io)?;
        if !metadata.is_dir() {
            return Ok(vec![self.input.clone()]);
        }

        let mut inputs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.input).await.map_err(LoadError::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(LoadError::Io)? {
            let path = entry.path();
            if path.is_file() && is_json(&path) {
                inputs.push(path);
            }
        }
        inputs.sort();

        if inputs.is_empty() {
            tracing::warn!(input = %self.input.display(), "No JSON documents found");
        }
        Ok(inputs)
    }
}

async fn compile_file(loader: &dyn Loader, path: &Path) -> Result<FlatGraph> {
    let bytes = tokio::fs::read(path).await.map_err(LoadError::Io)?;
    loader.compile(&bytes).map_err(|e| {
        let e = match e {
            LoadError::InvalidDocument { message, .. } => LoadError::InvalidDocument {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        };
        tracing::error!(path = %path.display(), error = %e, "Could not compile document");
        Error::Load(e)
    })
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chapter, Meta, Paragraph};
    use crate::graph::BOOK;
    use crate::store::MemoryStore;

    fn write_document(dir: &Path, name: &str, title: &str) {
        let doc = Document::new(Some(title.into()), vec!["Someone".into()], Meta::default()).with_chapters(vec![
            Chapter::new(None, 1, "First words.".into()).with_paragraphs(vec![Paragraph::new(1, "First words.".into())]),
        ]);
        std::fs::write(dir.join(name), doc.to_json_pretty().unwrap()).unwrap();
    }

    fn config() -> StoreConfig {
        StoreConfig::default().with_retry_base_delay_ms(1)
    }

    #[test]
    fn test_loader_registry() {
        assert_eq!("gutenberg".parse::<LoaderFormat>().unwrap(), LoaderFormat::Gutenberg);
        match "epub".parse::<LoaderFormat>() {
            Err(Error::UnsupportedFormat { available, .. }) => assert_eq!(available, "gutenberg"),
            other => panic!("expected unsupported format, got {other:?}"),
        }
        assert_eq!(LoaderFormat::Gutenberg.loader(BOOK).format(), LoaderFormat::Gutenberg);
    }

    #[test]
    fn test_compile_tolerates_string_author() {
        let json = br#"{"title": "T", "author": "Solo", "meta": {"language": null, "subject": null, "citation": "c"},
            "chapters": []}"#;
        let graph = GutenbergLoader::new(BOOK).compile(json).unwrap();

        assert_eq!(graph.entries.len(), 2);
        assert_eq!(graph.entries[0].data["author"][0], "Solo");
    }

    #[test]
    fn test_compile_rejects_garbage() {
        let result = GutenbergLoader::new(BOOK).compile(b"{not json");
        assert!(matches!(result, Err(LoadError::InvalidDocument { .. })));
    }

    #[tokio::test]
    async fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_document(dir.path(), "a.json", "A");
        write_document(dir.path(), "b.json", "B");
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();
        let store = Arc::new(MemoryStore::available());

        let report = LoadJob::new(dir.path(), LoaderFormat::Gutenberg, StoreSchema::gutenberg())
            .run(store.clone(), &config())
            .await
            .unwrap();

        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.documents[0].entries, 4);
        assert_eq!(report.total.upserted, 8);
        assert!(report.total.is_complete());
        assert_eq!(store.schemas().await, vec!["gutenberg".to_string()]);
    }

    #[tokio::test]
    async fn test_reload_does_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        write_document(dir.path(), "a.json", "A");
        let store = Arc::new(MemoryStore::available());
        let job = LoadJob::new(dir.path().join("a.json"), LoaderFormat::Gutenberg, StoreSchema::gutenberg());

        job.run(store.clone(), &config()).await.unwrap();
        let before = store.object_count().await;
        job.run(store.clone(), &config()).await.unwrap();

        assert_eq!(store.object_count().await, before);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_before_work() {
        let dir = tempfile::tempdir().unwrap();
        write_document(dir.path(), "a.json", "A");
        let store = Arc::new(MemoryStore::unavailable());

        let result = LoadJob::new(dir.path(), LoaderFormat::Gutenberg, StoreSchema::gutenberg())
            .run(store, &config())
            .await;

        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_invalid_document_names_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "[1, 2").unwrap();
        let store = Arc::new(MemoryStore::available());

        let result = LoadJob::new(dir.path(), LoaderFormat::Gutenberg, StoreSchema::gutenberg())
            .run(store, &config())
            .await;

        match result {
            Err(Error::Load(LoadError::InvalidDocument { path, .. })) => {
                assert_eq!(path, dir.path().join("broken.json"));
            }
            other => panic!("expected invalid document, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_input() {
        let store = Arc::new(MemoryStore::available());
        let result = LoadJob::new("/nonexistent/books", LoaderFormat::Gutenberg, StoreSchema::gutenberg())
            .run(store, &config())
            .await;

        assert!(matches!(result, Err(Error::Load(LoadError::Io(_)))));
    }
}
