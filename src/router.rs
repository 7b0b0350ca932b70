use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{Category, DownloadPolicy, PdbId, RetrievalOutcome};

/// Where one entry comes from and what it is called locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalPlan {
    pub id: PdbId,
    /// Path below the archive base URL.
    pub remote_path: String,
    /// Name the transfer is written to; remote files are always gzip-compressed.
    pub transfer_name: String,
    /// Name the entry has once retrieval is complete.
    pub final_name: String,
    pub needs_decompress: bool,
}

impl RetrievalPlan {
    pub fn url(&self, archive_base_url: &str) -> String {
        format!(
            "{}/{}",
            archive_base_url.trim_end_matches('/'),
            self.remote_path
        )
    }

    pub fn transfer_path(&self, output_dir: &Utf8Path) -> Utf8PathBuf {
        output_dir.join(&self.transfer_name)
    }

    pub fn final_path(&self, output_dir: &Utf8Path) -> Utf8PathBuf {
        output_dir.join(&self.final_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Skip(RetrievalOutcome),
    Fetch(RetrievalPlan),
}

/// Routing without looking at the local filesystem.
pub fn plan(id: &PdbId, category: Category, policy: &DownloadPolicy) -> Route {
    match category {
        Category::Invalid => Route::Skip(RetrievalOutcome::Invalid),
        Category::Indeterminate => Route::Skip(RetrievalOutcome::Unresolved),
        Category::Large if !policy.include_large => Route::Skip(RetrievalOutcome::SkippedLarge),
        Category::Obsolete if !policy.include_obsolete => {
            Route::Skip(RetrievalOutcome::SkippedObsolete)
        }
        Category::Large => Route::Fetch(bundle_plan(id)),
        Category::Standard => Route::Fetch(structure_plan(id, "divided", policy)),
        Category::Obsolete => Route::Fetch(structure_plan(id, "obsolete", policy)),
    }
}

/// Like [`plan`], but an entry whose final file already exists in `output_dir`
/// is reported as present instead of being fetched again.
pub fn route(
    id: &PdbId,
    category: Category,
    policy: &DownloadPolicy,
    output_dir: &Utf8Path,
) -> Route {
    match plan(id, category, policy) {
        Route::Fetch(plan) if crate::fs_util::file_exists(&plan.final_path(output_dir)) => {
            Route::Skip(RetrievalOutcome::AlreadyPresent)
        }
        other => other,
    }
}

fn bundle_plan(id: &PdbId) -> RetrievalPlan {
    let lower = id.to_lowercase();
    let name = format!("{lower}-bundle.tar.gz");
    RetrievalPlan {
        id: id.clone(),
        remote_path: format!(
            "compatible/pdb_bundle/{}/{lower}/{lower}-pdb-bundle.tar.gz",
            id.shard()
        ),
        transfer_name: name.clone(),
        final_name: name,
        needs_decompress: false,
    }
}

fn structure_plan(id: &PdbId, division: &str, policy: &DownloadPolicy) -> RetrievalPlan {
    let base = policy.format.base();
    let plain = format!("{}.{}", id.as_str(), base.local_ext());
    let compressed = format!("{plain}.gz");
    let needs_decompress = !policy.compressed();
    RetrievalPlan {
        id: id.clone(),
        remote_path: format!(
            "data/structures/{division}/{}/{}/{}",
            base.archive_dir(),
            id.shard(),
            base.remote_file_name(id)
        ),
        transfer_name: compressed.clone(),
        final_name: if needs_decompress { plain } else { compressed },
        needs_decompress,
    }
}
