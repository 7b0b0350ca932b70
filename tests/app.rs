use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;

use kira_pdb::app::{App, CancelToken, GetResult};
use kira_pdb::archive::ArchiveClient;
use kira_pdb::config::Settings;
use kira_pdb::domain::{BaseFormat, Category, DownloadPolicy, PdbId, RetrievalOutcome};
use kira_pdb::error::KiraError;
use kira_pdb::output::{JsonOutput, TextOutput};
use kira_pdb::rcsb::{IdSet, RcsbClient};

#[derive(Default)]
struct MockRcsb {
    obsolete: Vec<&'static str>,
    large: Vec<&'static str>,
    existing: Vec<&'static str>,
    large_index_down: bool,
    existence_calls: Arc<Mutex<usize>>,
}

fn to_set(values: &[&str]) -> IdSet {
    values.iter().map(|value| value.parse().unwrap()).collect()
}

impl RcsbClient for MockRcsb {
    fn fetch_obsolete_ids(&self) -> Result<IdSet, KiraError> {
        Ok(to_set(&self.obsolete))
    }

    fn fetch_large_ids(&self) -> Result<IdSet, KiraError> {
        if self.large_index_down {
            return Err(KiraError::RcsbHttp("connection refused".to_string()));
        }
        Ok(to_set(&self.large))
    }

    fn check_existence(&self, ids: &[PdbId]) -> Result<Vec<bool>, KiraError> {
        *self.existence_calls.lock().unwrap() += 1;
        let existing = to_set(&self.existing);
        Ok(ids.iter().map(|id| existing.contains(id)).collect())
    }
}

#[derive(Default)]
struct MockArchive {
    urls: Arc<Mutex<Vec<String>>>,
    corrupt: bool,
    missing: bool,
    cancel_after_first: Option<CancelToken>,
}

impl ArchiveClient for MockArchive {
    fn transfer(&self, url: &str, destination: &Utf8Path) -> Result<u64, KiraError> {
        self.urls.lock().unwrap().push(url.to_string());
        if let Some(cancel) = &self.cancel_after_first {
            cancel.cancel();
        }
        if self.missing {
            return Err(KiraError::ArchiveStatus {
                status: 404,
                url: url.to_string(),
            });
        }
        let bytes = if self.corrupt {
            b"not gzip".to_vec()
        } else {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(url.as_bytes()).unwrap();
            encoder.finish().unwrap()
        };
        std::fs::write(destination.as_std_path(), &bytes).unwrap();
        Ok(bytes.len() as u64)
    }
}

fn settings_in(dir: &tempfile::TempDir) -> Settings {
    Settings {
        output_dir: Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap(),
        workers: 2,
        ..Settings::default()
    }
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn outcome_of(result: &GetResult, id: &str) -> RetrievalOutcome {
    result
        .items
        .iter()
        .find(|item| item.id == id)
        .map(|item| item.outcome)
        .unwrap()
}

fn scenario_rcsb() -> MockRcsb {
    MockRcsb {
        obsolete: vec!["1ABC"],
        large: vec!["4V4B"],
        existing: vec!["1ABC", "4HHB", "4V4B"],
        ..MockRcsb::default()
    }
}

#[test]
fn search_reports_buckets_in_input_order() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(settings_in(&temp), scenario_rcsb(), MockArchive::default());

    let result = app.search(&ids(&["1abc", "9ZZZ", "4HHB"]), &JsonOutput);

    let categories = result
        .items
        .iter()
        .map(|item| (item.id.as_str(), item.category))
        .collect::<Vec<_>>();
    assert_eq!(
        categories,
        vec![
            ("1ABC", Category::Obsolete),
            ("9ZZZ", Category::Invalid),
            ("4HHB", Category::Standard),
        ]
    );
    assert!(result.failures.is_empty());
    let text = TextOutput::new(false).render_search(&result);
    assert!(text.contains("Valid PDB identifiers:\n4HHB\n"));
    assert!(!text.contains("Large PDB identifiers:"));
}

#[test]
fn existence_is_checked_in_one_batch() {
    let temp = tempfile::tempdir().unwrap();
    let rcsb = scenario_rcsb();
    let calls = Arc::clone(&rcsb.existence_calls);
    let app = App::new(settings_in(&temp), rcsb, MockArchive::default());

    let many = ids(&["1ABC", "4HHB", "4V4B", "9ZZZ", "2XYZ", "3DEF"]);
    let result = app.search(&many, &JsonOutput);
    assert_eq!(result.items.len(), many.len());
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn get_mmcif_downloads_and_decompresses() {
    let temp = tempfile::tempdir().unwrap();
    let settings = settings_in(&temp);
    let output_dir = settings.output_dir.clone();
    let archive = MockArchive::default();
    let app = App::new(settings, scenario_rcsb(), archive);
    let policy = DownloadPolicy::new(BaseFormat::Mmcif, false, false, false);

    let result = app
        .get(&ids(&["4HHB"]), policy, &CancelToken::new(), &JsonOutput)
        .unwrap();

    assert_eq!(outcome_of(&result, "4HHB"), RetrievalOutcome::Downloaded);
    assert!(output_dir.join("4HHB.cif").as_std_path().is_file());
    assert!(!output_dir.join("4HHB.cif.gz").as_std_path().exists());
    let text = TextOutput::new(false).render_get(&result);
    assert!(text.contains("Downloaded files: 1\n4HHB\n"));
}

#[test]
fn remote_path_for_mmcif() {
    let temp = tempfile::tempdir().unwrap();
    let archive = MockArchive::default();
    let urls = Arc::clone(&archive.urls);
    let policy = DownloadPolicy::new(BaseFormat::Mmcif, false, false, false);

    let app = App::new(settings_in(&temp), scenario_rcsb(), archive);
    app.get(&ids(&["4hhb"]), policy, &CancelToken::new(), &JsonOutput)
        .unwrap();
    assert_eq!(urls.lock().unwrap().len(), 1);
    let written = std::fs::read_to_string(temp.path().join("4HHB.cif")).unwrap();
    assert_eq!(
        written,
        "https://files.wwpdb.org/pub/pdb/data/structures/divided/mmCIF/hh/4hhb.cif.gz"
    );
}

#[test]
fn second_get_finds_file_already_present() {
    let temp = tempfile::tempdir().unwrap();
    let archive = MockArchive::default();
    let urls = Arc::clone(&archive.urls);
    let app = App::new(settings_in(&temp), scenario_rcsb(), archive);
    let policy = DownloadPolicy::new(BaseFormat::Pdb, false, false, false);

    let first = app
        .get(&ids(&["4HHB"]), policy, &CancelToken::new(), &JsonOutput)
        .unwrap();
    let second = app
        .get(&ids(&["4HHB"]), policy, &CancelToken::new(), &JsonOutput)
        .unwrap();

    assert_eq!(outcome_of(&first, "4HHB"), RetrievalOutcome::Downloaded);
    assert_eq!(outcome_of(&second, "4HHB"), RetrievalOutcome::AlreadyPresent);
    assert_eq!(urls.lock().unwrap().len(), 1);
}

#[test]
fn obsolete_entry_is_skipped_without_flag() {
    let temp = tempfile::tempdir().unwrap();
    let archive = MockArchive::default();
    let urls = Arc::clone(&archive.urls);
    let app = App::new(settings_in(&temp), scenario_rcsb(), archive);
    let policy = DownloadPolicy::new(BaseFormat::Pdb, false, false, false);

    let result = app
        .get(&ids(&["1ABC"]), policy, &CancelToken::new(), &JsonOutput)
        .unwrap();

    assert!(urls.lock().unwrap().is_empty());
    assert_eq!(outcome_of(&result, "1ABC"), RetrievalOutcome::SkippedObsolete);
    let text = TextOutput::new(false).render_get(&result);
    assert!(text.contains("Not downloaded obsolete files:\n1ABC\n"));
    assert!(text.contains("-obsolete"));
    assert!(std::fs::read_dir(temp.path()).unwrap().next().is_none());
}

#[test]
fn obsolete_and_large_with_flags() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(settings_in(&temp), scenario_rcsb(), MockArchive::default());
    let policy = DownloadPolicy::new(BaseFormat::Pdb, true, true, true);

    let result = app
        .get(&ids(&["1ABC", "4V4B"]), policy, &CancelToken::new(), &JsonOutput)
        .unwrap();

    assert_eq!(outcome_of(&result, "1ABC"), RetrievalOutcome::Downloaded);
    assert_eq!(outcome_of(&result, "4V4B"), RetrievalOutcome::Downloaded);
    assert!(temp.path().join("1ABC.pdb.gz").is_file());
    assert!(temp.path().join("4v4b-bundle.tar.gz").is_file());
}

#[test]
fn compressed_and_plain_names_differ() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("4HHB.pdb"), b"ATOM").unwrap();
    let app = App::new(settings_in(&temp), scenario_rcsb(), MockArchive::default());

    let plain = DownloadPolicy::new(BaseFormat::Pdb, false, false, false);
    let compressed = DownloadPolicy::new(BaseFormat::Pdb, true, false, false);
    let result = app
        .get(&ids(&["4HHB"]), plain, &CancelToken::new(), &JsonOutput)
        .unwrap();
    assert_eq!(outcome_of(&result, "4HHB"), RetrievalOutcome::AlreadyPresent);

    let result = app
        .get(&ids(&["4HHB"]), compressed, &CancelToken::new(), &JsonOutput)
        .unwrap();
    assert_eq!(outcome_of(&result, "4HHB"), RetrievalOutcome::Downloaded);
    assert!(temp.path().join("4HHB.pdb.gz").is_file());
}

#[test]
fn duplicates_are_transferred_once() {
    let temp = tempfile::tempdir().unwrap();
    let archive = MockArchive::default();
    let urls = Arc::clone(&archive.urls);
    let app = App::new(settings_in(&temp), scenario_rcsb(), archive);
    let policy = DownloadPolicy::new(BaseFormat::Pdb, true, false, false);

    let result = app
        .get(
            &ids(&["4hhb", "4HHB", "bad!"]),
            policy,
            &CancelToken::new(),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.items.len(), 2);
    assert_eq!(outcome_of(&result, "4HHB"), RetrievalOutcome::Downloaded);
    assert_eq!(outcome_of(&result, "BAD!"), RetrievalOutcome::Invalid);
    assert_eq!(urls.lock().unwrap().len(), 1);
}

#[test]
fn decompression_failure_is_partial() {
    let temp = tempfile::tempdir().unwrap();
    let archive = MockArchive {
        corrupt: true,
        ..MockArchive::default()
    };
    let app = App::new(settings_in(&temp), scenario_rcsb(), archive);
    let policy = DownloadPolicy::new(BaseFormat::Pdb, false, false, false);

    let result = app
        .get(&ids(&["4HHB"]), policy, &CancelToken::new(), &JsonOutput)
        .unwrap();

    assert_eq!(
        outcome_of(&result, "4HHB"),
        RetrievalOutcome::PartiallyDownloaded
    );
    assert!(temp.path().join("4HHB.pdb.gz").is_file());
    assert!(result.items[0].error.is_some());
}

#[test]
fn failed_transfer_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let archive = MockArchive {
        missing: true,
        ..MockArchive::default()
    };
    let app = App::new(settings_in(&temp), scenario_rcsb(), archive);
    let policy = DownloadPolicy::new(BaseFormat::Pdb, false, false, false);

    let result = app
        .get(&ids(&["4HHB"]), policy, &CancelToken::new(), &JsonOutput)
        .unwrap();

    assert_eq!(outcome_of(&result, "4HHB"), RetrievalOutcome::Failed);
    assert!(!temp.path().join("4HHB.pdb").exists());
}

#[test]
fn unavailable_index_leaves_entries_unresolved() {
    let temp = tempfile::tempdir().unwrap();
    let rcsb = MockRcsb {
        large_index_down: true,
        ..scenario_rcsb()
    };
    let app = App::new(settings_in(&temp), rcsb, MockArchive::default());
    let policy = DownloadPolicy::new(BaseFormat::Pdb, false, true, true);

    let result = app
        .get(&ids(&["4HHB", "1ABC", "9ZZZ"]), policy, &CancelToken::new(), &JsonOutput)
        .unwrap();

    assert_eq!(outcome_of(&result, "4HHB"), RetrievalOutcome::Unresolved);
    assert_eq!(outcome_of(&result, "1ABC"), RetrievalOutcome::Downloaded);
    assert_eq!(outcome_of(&result, "9ZZZ"), RetrievalOutcome::Invalid);
    assert_eq!(result.failures.len(), 1);
    let text = TextOutput::new(false).render_get(&result);
    assert!(text.contains("warning: large entry index unavailable"));
}

#[test]
fn cancelled_run_starts_no_transfers() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(settings_in(&temp), scenario_rcsb(), MockArchive::default());
    let policy = DownloadPolicy::new(BaseFormat::Pdb, false, false, false);
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = app
        .get(&ids(&["4HHB", "1ABC"]), policy, &cancel, &JsonOutput)
        .unwrap();

    assert_eq!(outcome_of(&result, "4HHB"), RetrievalOutcome::Cancelled);
    assert_eq!(outcome_of(&result, "1ABC"), RetrievalOutcome::SkippedObsolete);
}

#[test]
fn expired_run_deadline_cancels_transfers() {
    let temp = tempfile::tempdir().unwrap();
    let settings = Settings {
        run_timeout: Some(Duration::ZERO),
        ..settings_in(&temp)
    };
    let archive = MockArchive::default();
    let urls = Arc::clone(&archive.urls);
    let app = App::new(settings, scenario_rcsb(), archive);
    let policy = DownloadPolicy::new(BaseFormat::Pdb, false, false, false);

    let result = app
        .get(&ids(&["4HHB"]), policy, &CancelToken::new(), &JsonOutput)
        .unwrap();

    assert_eq!(outcome_of(&result, "4HHB"), RetrievalOutcome::Cancelled);
    assert!(urls.lock().unwrap().is_empty());
    let text = TextOutput::new(false).render_get(&result);
    assert!(text.contains("Cancelled downloads:\n4HHB\n"));
}

#[test]
fn interrupt_during_run_stops_remaining_transfers() {
    let temp = tempfile::tempdir().unwrap();
    let settings = Settings {
        workers: 1,
        ..settings_in(&temp)
    };
    let cancel = CancelToken::new();
    let archive = MockArchive {
        cancel_after_first: Some(cancel.clone()),
        ..MockArchive::default()
    };
    let urls = Arc::clone(&archive.urls);
    let app = App::new(settings, scenario_rcsb(), archive);
    let policy = DownloadPolicy::new(BaseFormat::Pdb, false, true, false);

    let result = app
        .get(&ids(&["4HHB", "4V4B"]), policy, &cancel, &JsonOutput)
        .unwrap();

    assert_eq!(urls.lock().unwrap().len(), 1);
    assert_eq!(outcome_of(&result, "4HHB"), RetrievalOutcome::Downloaded);
    assert_eq!(outcome_of(&result, "4V4B"), RetrievalOutcome::Cancelled);
    assert!(temp.path().join("4HHB.pdb").is_file());
    let leftovers = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
        .count();
    assert_eq!(leftovers, 0);
}
