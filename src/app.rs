use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::archive::ArchiveClient;
use crate::classify::{IndexFailure, classify};
use crate::config::Settings;
use crate::domain::{Category, DownloadPolicy, PdbId, RetrievalOutcome};
use crate::error::KiraError;
use crate::rcsb::RcsbClient;
use crate::router::{Route, RetrievalPlan, route};

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub items: Vec<SearchItem>,
    pub failures: Vec<IndexFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchItem {
    pub id: String,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetResult {
    pub policy: DownloadPolicy,
    pub items: Vec<GetItem>,
    pub failures: Vec<IndexFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetItem {
    pub id: String,
    pub category: Category,
    pub outcome: RetrievalOutcome,
    pub path: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

/// Shared stop flag; transfers that have not started yet are abandoned once set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Routes Ctrl-C to this token so running transfers finish and the rest are
    /// reported as cancelled. Only one handler can be installed per process.
    pub fn cancel_on_interrupt(&self) -> Result<(), KiraError> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            warn!("interrupted, waiting for running transfers");
            token.cancel();
        })
        .map_err(|err| KiraError::InterruptHandler(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Id(PdbId),
    Malformed(String),
}

impl Input {
    fn label(&self) -> String {
        match self {
            Input::Id(id) => id.to_string(),
            Input::Malformed(raw) => raw.clone(),
        }
    }
}

struct RunControl<'a> {
    cancel: &'a CancelToken,
    deadline: Option<Instant>,
}

impl RunControl<'_> {
    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
            || self
                .deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false)
    }
}

pub struct App<R: RcsbClient, A: ArchiveClient> {
    settings: Settings,
    rcsb: R,
    archive: A,
}

impl<R: RcsbClient, A: ArchiveClient> App<R, A> {
    pub fn new(settings: Settings, rcsb: R, archive: A) -> Self {
        Self {
            settings,
            rcsb,
            archive,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Classification only, nothing is written.
    pub fn search(&self, raw_ids: &[String], sink: &dyn ProgressSink) -> SearchResult {
        let (inputs, categories, failures) = self.classify_inputs(raw_ids, sink);
        let items = inputs
            .iter()
            .zip(categories)
            .map(|(input, category)| SearchItem {
                id: input.label(),
                category,
            })
            .collect();
        SearchResult { items, failures }
    }

    pub fn get(
        &self,
        raw_ids: &[String],
        policy: DownloadPolicy,
        cancel: &CancelToken,
        sink: &dyn ProgressSink,
    ) -> Result<GetResult, KiraError> {
        let control = RunControl {
            cancel,
            deadline: self.settings.run_timeout.map(|limit| Instant::now() + limit),
        };
        let (inputs, categories, failures) = self.classify_inputs(raw_ids, sink);

        fs::create_dir_all(self.settings.output_dir.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;

        sink.event(ProgressEvent {
            message: format!("phase=Download; workers={}", self.settings.workers),
            elapsed: None,
        });
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.workers)
            .build()
            .map_err(|err| KiraError::WorkerPool(err.to_string()))?;

        // Indexed collect keeps input order whatever the completion order.
        let items = pool.install(|| {
            inputs
                .par_iter()
                .zip(categories.par_iter())
                .map(|(input, category)| match input {
                    Input::Id(id) => self.retrieve(id, *category, &policy, &control, sink),
                    Input::Malformed(raw) => GetItem {
                        id: raw.clone(),
                        category: Category::Invalid,
                        outcome: RetrievalOutcome::Invalid,
                        path: None,
                        error: None,
                    },
                })
                .collect::<Vec<_>>()
        });

        Ok(GetResult {
            policy,
            items,
            failures,
        })
    }

    fn classify_inputs(
        &self,
        raw_ids: &[String],
        sink: &dyn ProgressSink,
    ) -> (Vec<Input>, Vec<Category>, Vec<IndexFailure>) {
        let inputs = prepare_inputs(raw_ids);
        let ids = inputs
            .iter()
            .filter_map(|input| match input {
                Input::Id(id) => Some(id.clone()),
                Input::Malformed(_) => None,
            })
            .collect::<Vec<_>>();

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; classifying {} identifiers", ids.len()),
            elapsed: None,
        });
        let start = Instant::now();
        let classification = if ids.is_empty() {
            None
        } else {
            Some(classify(&self.rcsb, &ids))
        };
        sink.event(ProgressEvent {
            message: "rcsb.response".to_string(),
            elapsed: Some(start.elapsed()),
        });

        let (resolved, failures) = match classification {
            Some(classification) => (classification.categories, classification.failures),
            None => (Vec::new(), Vec::new()),
        };
        let mut resolved = resolved.into_iter();
        let categories = inputs
            .iter()
            .map(|input| match input {
                Input::Id(_) => resolved.next().unwrap_or(Category::Indeterminate),
                Input::Malformed(_) => Category::Invalid,
            })
            .collect();
        (inputs, categories, failures)
    }

    fn retrieve(
        &self,
        id: &PdbId,
        category: Category,
        policy: &DownloadPolicy,
        control: &RunControl<'_>,
        sink: &dyn ProgressSink,
    ) -> GetItem {
        let output_dir = &self.settings.output_dir;
        let plan = match route(id, category, policy, output_dir) {
            Route::Skip(outcome) => {
                let path = (outcome == RetrievalOutcome::AlreadyPresent)
                    .then(|| crate::router::plan(id, category, policy))
                    .and_then(|route| match route {
                        Route::Fetch(plan) => Some(plan.final_path(output_dir).to_string()),
                        Route::Skip(_) => None,
                    });
                return item(id, category, outcome, path, None);
            }
            Route::Fetch(plan) => plan,
        };

        if control.should_stop() {
            return item(id, category, RetrievalOutcome::Cancelled, None, None);
        }
        self.download(&plan, category, sink)
    }

    fn download(
        &self,
        plan: &RetrievalPlan,
        category: Category,
        sink: &dyn ProgressSink,
    ) -> GetItem {
        let output_dir = &self.settings.output_dir;
        let url = plan.url(&self.settings.archive_base_url);
        let transfer_path = plan.transfer_path(output_dir);

        sink.event(ProgressEvent {
            message: format!("archive.request {}", plan.id),
            elapsed: None,
        });
        let start = Instant::now();
        if let Err(err) = self.archive.transfer(&url, &transfer_path) {
            warn!(id = %plan.id, url = %url, error = %err, "transfer failed");
            return item(
                &plan.id,
                category,
                RetrievalOutcome::Failed,
                None,
                Some(err.to_string()),
            );
        }
        sink.event(ProgressEvent {
            message: format!("archive.response {}", plan.id),
            elapsed: Some(start.elapsed()),
        });

        if !plan.needs_decompress {
            info!(id = %plan.id, path = %transfer_path, "downloaded");
            return item(
                &plan.id,
                category,
                RetrievalOutcome::Downloaded,
                Some(transfer_path.to_string()),
                None,
            );
        }

        match self.archive.decompress(&transfer_path) {
            Ok(path) => {
                info!(id = %plan.id, path = %path, "downloaded");
                item(
                    &plan.id,
                    category,
                    RetrievalOutcome::Downloaded,
                    Some(path.to_string()),
                    None,
                )
            }
            Err(err) => {
                warn!(id = %plan.id, error = %err, "decompression failed");
                item(
                    &plan.id,
                    category,
                    RetrievalOutcome::PartiallyDownloaded,
                    Some(transfer_path.to_string()),
                    Some(err.to_string()),
                )
            }
        }
    }
}

fn item(
    id: &PdbId,
    category: Category,
    outcome: RetrievalOutcome,
    path: Option<String>,
    error: Option<String>,
) -> GetItem {
    GetItem {
        id: id.to_string(),
        category,
        outcome,
        path,
        error,
    }
}

/// Canonicalizes input, keeps the first occurrence of each identifier and marks
/// strings that cannot be identifiers so they never reach the remote service.
fn prepare_inputs(raw_ids: &[String]) -> Vec<Input> {
    let mut seen = HashSet::new();
    raw_ids
        .iter()
        .filter(|raw| !raw.trim().is_empty())
        .filter(|raw| seen.insert(raw.trim().to_ascii_uppercase()))
        .map(|raw| match raw.parse::<PdbId>() {
            Ok(id) => Input::Id(id),
            Err(_) => Input::Malformed(raw.trim().to_ascii_uppercase()),
        })
        .collect()
}
