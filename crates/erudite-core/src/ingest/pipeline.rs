use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::extractor::{ExtractError, Extractor, ExtractorFormat};
use crate::{Error, Result};

const INPUT_EXTENSIONS: &[&str] = &["html", "htm"];

/// One input file and where its JSON goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedExtraction {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub chapters: usize,
    pub paragraphs: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub files: Vec<ExtractedFile>,
    pub duration_ms: u64,
}

impl ExtractReport {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn chapter_count(&self) -> usize {
        self.files.iter().map(|f| f.chapters).sum()
    }

    pub fn paragraph_count(&self) -> usize {
        self.files.iter().map(|f| f.paragraphs).sum()
    }
}

/// Extraction run over one markup file or a directory of them.
///
/// Destinations are planned in file-name order. With overwrite disabled the
/// first destination that already exists (on disk, or earlier in the same
/// plan) ends the plan: files before it are still extracted, nothing after it
/// is, and the run reports [`Error::OutputAlreadyExists`].
pub struct ExtractJob {
    input: PathBuf,
    output: Option<PathBuf>,
    format: ExtractorFormat,
    overwrite: bool,
    concurrency: usize,
}

impl ExtractJob {
    #[must_use]
    pub fn new(input: impl Into<PathBuf>, format: ExtractorFormat) -> Self {
        Self {
            input: input.into(),
            output: None,
            format,
            overwrite: false,
            concurrency: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    #[must_use]
    pub const fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run(&self) -> Result<ExtractReport> {
        let start = std::time::Instant::now();
        let inputs = self.collect_inputs().await?;
        let (plan, collision) = self.plan(&inputs);

        tracing::info!(
            input = %self.input.display(),
            format = %self.format,
            files = plan.len(),
            "Starting extraction"
        );

        let mut files = self.execute(plan).await?;
        files.sort_by(|a, b| a.input.cmp(&b.input));

        if let Some(path) = collision {
            tracing::error!(output = %path.display(), "Output exists and overwrite is disabled");
            return Err(Error::OutputAlreadyExists(path));
        }

        Ok(ExtractReport {
            files,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn collect_inputs(&self) -> Result<Vec<PathBuf>> {
        let metadata = tokio::fs::metadata(&self.input).await.map_err(ExtractError::Io)?;

        if !metadata.is_dir() {
            if !is_markup(&self.input) {
                return Err(Error::UnsupportedFormat {
                    name: self.input.display().to_string(),
                    available: INPUT_EXTENSIONS.join(", "),
                });
            }
            return Ok(vec![self.input.clone()]);
        }

        let mut inputs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.input).await.map_err(ExtractError::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(ExtractError::Io)? {
            let path = entry.path();
            if path.is_file() && is_markup(&path) {
                inputs.push(path);
            }
        }
        inputs.sort();
        Ok(inputs)
    }

    /// Destinations in order, cut at the first collision.
    fn plan(&self, inputs: &[PathBuf]) -> (Vec<PlannedExtraction>, Option<PathBuf>) {
        let mut plan: Vec<PlannedExtraction> = Vec::new();
        let mut planned: HashSet<PathBuf> = HashSet::new();

        for input in inputs {
            let output = self.output_path(input);
            let repeated = planned.contains(&output);

            if !self.overwrite && (repeated || output.exists()) {
                return (plan, Some(output));
            }

            if repeated {
                // Last writer wins; keep a single task per destination.
                plan.retain(|p| p.output != output);
            }
            planned.insert(output.clone());
            plan.push(PlannedExtraction {
                input: input.clone(),
                output,
            });
        }

        (plan, None)
    }

    fn output_path(&self, input: &Path) -> PathBuf {
        let json_name = || {
            let stem = input.file_stem().map_or_else(
                || "document".to_string(),
                |s| s.to_string_lossy().to_string(),
            );
            format!("{stem}.json")
        };

        match &self.output {
            Some(out) if out.is_dir() => out.join(json_name()),
            Some(out) => out.clone(),
            None => input.with_file_name(json_name()),
        }
    }

    async fn execute(&self, plan: Vec<PlannedExtraction>) -> Result<Vec<ExtractedFile>> {
        let extractor: Arc<dyn Extractor> = Arc::from(self.format.extractor()?);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Result<ExtractedFile>> = JoinSet::new();

        for job in plan {
            let extractor = Arc::clone(&extractor);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?;

                tokio::task::spawn_blocking(move || extract_one(extractor.as_ref(), job))
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?
            });
        }

        let mut files = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(|e| Error::Internal(e.to_string()))? {
                Ok(file) => files.push(file),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        Ok(files)
    }
}

fn extract_one(extractor: &dyn Extractor, job: PlannedExtraction) -> Result<ExtractedFile> {
    let document = extractor.extract(&job.input, &job.output).map_err(|source| {
        tracing::error!(input = %job.input.display(), error = %source, "Extraction failed");
        Error::Document {
            path: job.input.clone(),
            source,
        }
    })?;

    tracing::info!(
        input = %job.input.display(),
        output = %job.output.display(),
        chapters = document.chapters.len(),
        "Extracted"
    );

    Ok(ExtractedFile {
        input: job.input,
        output: job.output,
        chapters: document.chapters.len(),
        paragraphs: document.paragraph_count(),
    })
}

fn is_markup(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| INPUT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}
