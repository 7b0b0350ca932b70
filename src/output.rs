use std::io::{self, Write};

use crossterm::style::Stylize;
use serde::Serialize;
use tracing::debug;

use crate::app::{GetResult, ProgressEvent, ProgressSink, SearchResult};
use crate::classify::{IndexFailure, RemoteIndex};
use crate::domain::{Category, RetrievalOutcome};

pub const IDS_PER_LINE: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

/// Report sections of `get`, in print order.
const GET_BUCKETS: &[(RetrievalOutcome, &str, &str)] = &[
    (
        RetrievalOutcome::AlreadyPresent,
        "Files already present:",
        "These files exist in the output directory and were not downloaded again.",
    ),
    (RetrievalOutcome::Downloaded, "Downloaded files:", ""),
    (
        RetrievalOutcome::PartiallyDownloaded,
        "Partially downloaded files:",
        "The archive could not be decompressed; the .gz file was kept.",
    ),
    (
        RetrievalOutcome::Failed,
        "Failed downloads:",
        "The PDB archive did not deliver these files.",
    ),
    (RetrievalOutcome::Invalid, "Unvalid PDB identifiers:", ""),
    (
        RetrievalOutcome::Unresolved,
        "Unresolved PDB identifiers:",
        "A remote index could not be fetched, so these entries were left alone.",
    ),
    (
        RetrievalOutcome::SkippedLarge,
        "Not downloaded large files:",
        "Large structures are distributed as bundles, pass -large to download them.",
    ),
    (
        RetrievalOutcome::SkippedObsolete,
        "Not downloaded obsolete files:",
        "These entries are obsolete, pass -obsolete to download them.",
    ),
    (
        RetrievalOutcome::Cancelled,
        "Cancelled downloads:",
        "The run was interrupted before these transfers started.",
    ),
];

const SEARCH_BUCKETS: &[(Category, &str, &str)] = &[
    (Category::Standard, "Valid PDB identifiers:", ""),
    (
        Category::Large,
        "Large PDB identifiers:",
        "Available as bundles only, use get -large to download them.",
    ),
    (
        Category::Obsolete,
        "Obsolete PDB identifiers:",
        "Superseded entries, use get -obsolete to download them.",
    ),
    (Category::Invalid, "Unvalid PDB identifiers:", ""),
    (
        Category::Indeterminate,
        "Unresolved PDB identifiers:",
        "A remote index could not be fetched, so these entries were left alone.",
    ),
];

pub struct TextOutput {
    styled: bool,
}

impl TextOutput {
    pub fn new(styled: bool) -> Self {
        Self { styled }
    }

    pub fn render_search(&self, result: &SearchResult) -> String {
        let mut out = self.render_failures(&result.failures);
        for (category, title, help) in SEARCH_BUCKETS {
            let ids = result
                .items
                .iter()
                .filter(|item| item.category == *category)
                .map(|item| item.id.as_str())
                .collect::<Vec<_>>();
            // The valid bucket is always shown, like the original two-column report.
            if ids.is_empty() && *category != Category::Standard {
                continue;
            }
            out.push_str(&self.render_bucket(title, &ids, help));
        }
        out
    }

    pub fn render_get(&self, result: &GetResult) -> String {
        let mut out = self.render_failures(&result.failures);
        for (outcome, title, help) in GET_BUCKETS {
            let ids = result
                .items
                .iter()
                .filter(|item| item.outcome == *outcome)
                .map(|item| item.id.as_str())
                .collect::<Vec<_>>();
            if ids.is_empty() {
                continue;
            }
            let title = match outcome {
                RetrievalOutcome::Downloaded => format!("Downloaded files: {}", ids.len()),
                _ => title.to_string(),
            };
            out.push_str(&self.render_bucket(&title, &ids, help));
        }
        out
    }

    pub fn print_search(&self, result: &SearchResult) -> io::Result<()> {
        write_stdout(&self.render_search(result))
    }

    pub fn print_get(&self, result: &GetResult) -> io::Result<()> {
        write_stdout(&self.render_get(result))
    }

    fn render_bucket(&self, title: &str, ids: &[&str], help: &str) -> String {
        let mut out = String::from("\n");
        if self.styled {
            out.push_str(&format!("{}", title.bold()));
        } else {
            out.push_str(title);
        }
        out.push('\n');
        out.push_str(&wrap_ids(ids, IDS_PER_LINE));
        if !help.is_empty() {
            if self.styled {
                out.push_str(&format!("{}\n", help.dark_yellow()));
            } else {
                out.push_str(help);
                out.push('\n');
            }
        }
        out
    }

    fn render_failures(&self, failures: &[IndexFailure]) -> String {
        let mut out = String::new();
        for failure in failures {
            let name = match failure.index {
                RemoteIndex::Obsolete => "obsolete entry index",
                RemoteIndex::Large => "large entry index",
                RemoteIndex::Existence => "entry status query",
            };
            let line = format!("warning: {name} unavailable: {}", failure.message);
            if self.styled {
                out.push_str(&format!("{}\n", line.red()));
            } else {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => debug!(latency_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => debug!("{}", event.message),
        }
    }
}

/// Identifiers joined by spaces, `per_line` to a line.
pub fn wrap_ids(ids: &[&str], per_line: usize) -> String {
    let mut out = String::new();
    for chunk in ids.chunks(per_line.max(1)) {
        out.push_str(&chunk.join(" "));
        out.push('\n');
    }
    out
}

pub struct JsonOutput;

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    generated_at: String,
    tool: String,
    #[serde(flatten)]
    result: &'a T,
}

impl JsonOutput {
    pub fn print_search(result: &SearchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_get(result: &GetResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let envelope = Envelope {
            generated_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("kira-pdb/{}", env!("CARGO_PKG_VERSION")),
            result: value,
        };
        let json = serde_json::to_string_pretty(&envelope).map_err(io::Error::other)?;
        write_stdout(&format!("{json}\n"))
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

fn write_stdout(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()
}
