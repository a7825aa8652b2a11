use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use console::style;

use erudite_core::store::EmitReport;
use erudite_core::{LoadJob, LoaderFormat, StoreConfig, StoreSchema, WeaviateClient};

pub async fn run(input: &Path, target: &str, schema: &str, format: &str, key: Option<String>) -> Result<()> {
    let format: LoaderFormat = format.parse()?;
    let schema = StoreSchema::by_name(schema)?;

    let config = StoreConfig::from_env(target).with_api_key(key);
    config.validate()?;
    let client = WeaviateClient::new(config.clone())?;

    let report = LoadJob::new(input, format, schema)
        .run(Arc::new(client), &config)
        .await?;

    for document in &report.documents {
        println!(
            "{} ({} entries, {} stored)",
            document.path.display(),
            document.entries,
            document.report.upserted
        );
    }
    print_summary(&report.total, report.documents.len(), report.duration_ms);

    Ok(())
}

fn print_summary(total: &EmitReport, documents: usize, duration_ms: u64) {
    let marker = if total.is_complete() {
        style("✓").green()
    } else {
        style("!").yellow()
    };
    eprintln!(
        "{marker} Loaded {documents} document(s): {} entries, {} links in {duration_ms}ms",
        total.upserted, total.links
    );

    for failed in &total.failed {
        eprintln!("  {} {}: {}", style("✗").red(), failed.entry, failed.reason);
    }
    for failed in &total.link_failures {
        eprintln!(
            "  {} {}.{} -> {}: {}",
            style("✗").red(),
            failed.from,
            failed.property,
            failed.to,
            failed.reason
        );
    }
    if total.skipped_links > 0 {
        eprintln!("  {} links skipped", total.skipped_links);
    }
}
