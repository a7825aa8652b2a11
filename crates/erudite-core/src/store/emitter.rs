use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::config::StoreConfig;
use super::connector::{StoreConnector, StoreError, StoreResult};
use crate::graph::{EntryRef, FlatGraph, Reference};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("Store unreachable, batch aborted: {0}")]
    Unreachable(String),
    #[error("Emit task failed: {0}")]
    Aborted(String),
}

pub type EmitResult<T> = Result<T, EmitError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    pub entry: EntryRef,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLink {
    pub from: EntryRef,
    pub property: String,
    pub to: EntryRef,
    pub reason: String,
}

/// Outcome of emitting one or more graphs.
#[derive(Debug, Clone, Default)]
pub struct EmitReport {
    pub upserted: usize,
    pub failed: Vec<FailedEntry>,
    pub links: usize,
    pub link_failures: Vec<FailedLink>,
    /// Links never issued because an endpoint failed to upsert
    pub skipped_links: usize,
}

impl EmitReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.link_failures.is_empty() && self.skipped_links == 0
    }

    pub fn merge(&mut self, other: Self) {
        self.upserted += other.upserted;
        self.failed.extend(other.failed);
        self.links += other.links;
        self.link_failures.extend(other.link_failures);
        self.skipped_links += other.skipped_links;
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    deadline: Duration,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    fn from_config(config: &StoreConfig) -> Self {
        Self {
            deadline: config.operation_timeout(),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Exponential delay before retry `attempt` (1-based), plus up to half
    /// the base delay of jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor).min(MAX_BACKOFF);

        let jitter_ms = u64::try_from(self.base_delay.as_millis() / 2).unwrap_or(0);
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        delay + Duration::from_millis(jitter)
    }
}

#[derive(Debug, Clone)]
enum Operation {
    Upsert { key: EntryRef, data: Map<String, Value> },
    Link { from: EntryRef, property: String, to: EntryRef },
}

impl Operation {
    async fn apply(&self, connector: &dyn StoreConnector) -> StoreResult<()> {
        match self {
            Self::Upsert { key, data } => connector.upsert(&key.class_name, key.id, data).await,
            Self::Link { from, property, to } => connector.link(from, property, to).await,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upsert { key, .. } => write!(f, "upsert {key}"),
            Self::Link { from, property, to } => write!(f, "link {from}.{property} -> {to}"),
        }
    }
}

/// Writes a [`FlatGraph`] to a store.
///
/// Every distinct entry is upserted once, concurrently, bounded by the
/// configured concurrency. A reference is linked as soon as both of its endpoints have
/// been acknowledged, in both directions when it is bidirectional. Failed
/// entries are reported and their links skipped; the rest of the batch
/// carries on. A store that stays unreachable after retries aborts the
/// whole batch.
pub struct BatchEmitter {
    connector: Arc<dyn StoreConnector>,
    policy: RetryPolicy,
    concurrency: usize,
}

impl BatchEmitter {
    pub fn new(connector: Arc<dyn StoreConnector>, config: &StoreConfig) -> Self {
        Self {
            connector,
            policy: RetryPolicy::from_config(config),
            concurrency: config.concurrency.max(1),
        }
    }

    pub async fn emit(&self, graph: &FlatGraph) -> EmitResult<EmitReport> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(Operation, StoreResult<()>)> = JoinSet::new();
        let mut report = EmitReport::default();

        let references = distinct_references(graph);
        let mut by_endpoint: HashMap<EntryRef, Vec<usize>> = HashMap::new();
        for (index, reference) in references.iter().enumerate() {
            by_endpoint.entry(reference.parent.clone()).or_default().push(index);
            if reference.child != reference.parent {
                by_endpoint.entry(reference.child.clone()).or_default().push(index);
            }
        }

        let mut acknowledged: HashSet<EntryRef> = HashSet::new();
        let mut scheduled: HashSet<usize> = HashSet::new();

        let mut pending: HashSet<EntryRef> = HashSet::new();
        for entry in &graph.entries {
            if !pending.insert(entry.key()) {
                continue;
            }
            self.spawn(
                &mut tasks,
                &semaphore,
                Operation::Upsert {
                    key: entry.key(),
                    data: entry.data.clone(),
                },
            );
        }

        while let Some(joined) = tasks.join_next().await {
            let (operation, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tasks.abort_all();
                    return Err(EmitError::Aborted(e.to_string()));
                }
            };

            if let Err(ref error) = result {
                if error.is_unreachable() {
                    tasks.abort_all();
                    tracing::error!(operation = %operation, error = %error, "Store unreachable, aborting batch");
                    return Err(EmitError::Unreachable(error.to_string()));
                }
            }

            match (operation, result) {
                (Operation::Upsert { key, .. }, Ok(())) => {
                    tracing::debug!(class = %key.class_name, id = %key.id, "Upserted");
                    report.upserted += 1;

                    for &index in by_endpoint.get(&key).map_or(&[][..], Vec::as_slice) {
                        let reference = references[index];
                        let other = if reference.parent == key {
                            &reference.child
                        } else {
                            &reference.parent
                        };
                        if (other == &key || acknowledged.contains(other)) && scheduled.insert(index) {
                            self.spawn(
                                &mut tasks,
                                &semaphore,
                                Operation::Link {
                                    from: reference.parent.clone(),
                                    property: reference.on_parent_property.clone(),
                                    to: reference.child.clone(),
                                },
                            );
                            if let Some(ref back) = reference.on_child_property {
                                self.spawn(
                                    &mut tasks,
                                    &semaphore,
                                    Operation::Link {
                                        from: reference.child.clone(),
                                        property: back.clone(),
                                        to: reference.parent.clone(),
                                    },
                                );
                            }
                        }
                    }
                    acknowledged.insert(key);
                }
                (Operation::Upsert { key, .. }, Err(error)) => {
                    tracing::warn!(class = %key.class_name, id = %key.id, error = %error, "Upsert failed");
                    report.failed.push(FailedEntry {
                        entry: key,
                        reason: error.to_string(),
                    });
                }
                (Operation::Link { .. }, Ok(())) => report.links += 1,
                (Operation::Link { from, property, to }, Err(error)) => {
                    tracing::warn!(from = %from, property = %property, to = %to, error = %error, "Link failed");
                    report.link_failures.push(FailedLink {
                        from,
                        property,
                        to,
                        reason: error.to_string(),
                    });
                }
            }
        }

        for (index, reference) in references.iter().enumerate() {
            if scheduled.contains(&index) {
                continue;
            }
            let links = if reference.is_bidirectional() { 2 } else { 1 };
            tracing::warn!(reference = %reference, "Skipping link, endpoint was not stored");
            report.skipped_links += links;
        }

        tracing::info!(
            upserted = report.upserted,
            failed = report.failed.len(),
            links = report.links,
            link_failures = report.link_failures.len(),
            skipped_links = report.skipped_links,
            "Batch emitted"
        );

        Ok(report)
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<(Operation, StoreResult<()>)>,
        semaphore: &Arc<Semaphore>,
        operation: Operation,
    ) {
        let connector = Arc::clone(&self.connector);
        let semaphore = Arc::clone(semaphore);
        let policy = self.policy;

        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => apply_with_retry(connector.as_ref(), &operation, policy).await,
                Err(e) => Err(StoreError::Unreachable(format!("emitter closed: {e}"))),
            };
            (operation, result)
        });
    }
}

/// References in graph order with repeats dropped.
fn distinct_references(graph: &FlatGraph) -> Vec<&Reference> {
    let mut seen = HashSet::new();
    graph.references.iter().filter(|r| seen.insert(*r)).collect()
}

async fn apply_with_retry(
    connector: &dyn StoreConnector,
    operation: &Operation,
    policy: RetryPolicy,
) -> StoreResult<()> {
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.deadline, operation.apply(connector)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(format!(
                "{operation} exceeded {}s",
                policy.deadline.as_secs()
            ))),
        };

        match result {
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                tracing::debug!(
                    operation = %operation,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Retrying"
                );
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
