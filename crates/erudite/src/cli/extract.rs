use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use erudite_core::{ExtractJob, ExtractorFormat};

pub async fn run(
    input: &Path,
    output: Option<&Path>,
    format: &str,
    overwrite: bool,
    jobs: Option<usize>,
) -> Result<()> {
    let format: ExtractorFormat = format.parse()?;

    let mut job = ExtractJob::new(input, format).with_overwrite(overwrite);
    if let Some(output) = output {
        // An output without an extension names a directory.
        if output.extension().is_none() && !output.exists() {
            std::fs::create_dir_all(output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
        }
        job = job.with_output(output);
    }
    if let Some(jobs) = jobs {
        job = job.with_concurrency(jobs);
    }

    let report = job.run().await?;

    for file in &report.files {
        println!("{}", file.output.display());
    }
    eprintln!(
        "{} Extracted {} file(s): {} chapters, {} paragraphs in {}ms",
        style("✓").green(),
        report.file_count(),
        report.chapter_count(),
        report.paragraph_count(),
        report.duration_ms
    );

    Ok(())
}
