use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{Category, PdbId};
use crate::error::KiraError;
use crate::rcsb::{IdSet, RcsbClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteIndex {
    Obsolete,
    Large,
    Existence,
}

/// A reference fetch that failed; entries depending on it become `Indeterminate`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexFailure {
    pub index: RemoteIndex,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub categories: Vec<Category>,
    pub failures: Vec<IndexFailure>,
}

/// Fetches both reference lists and the existence answer (concurrently, all three
/// must finish before anything is categorized), then assigns one category per input
/// identifier in input order.
pub fn classify<R: RcsbClient + ?Sized>(client: &R, ids: &[PdbId]) -> Classification {
    let (obsolete, (large, exists)) = rayon::join(
        || client.fetch_obsolete_ids(),
        || rayon::join(|| client.fetch_large_ids(), || client.check_existence(ids)),
    );

    let mut failures = Vec::new();
    let obsolete = record(RemoteIndex::Obsolete, obsolete, &mut failures);
    let large = record(RemoteIndex::Large, large, &mut failures);
    let exists = exists.and_then(|flags| {
        if flags.len() == ids.len() {
            Ok(flags)
        } else {
            Err(KiraError::RcsbResponse(format!(
                "existence answer covers {} of {} identifiers",
                flags.len(),
                ids.len()
            )))
        }
    });
    let exists = record(RemoteIndex::Existence, exists, &mut failures);

    let categories = ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let category = categorize(
                id,
                exists.as_ref().map(|flags| flags[index]),
                obsolete.as_ref(),
                large.as_ref(),
            );
            debug!(id = %id, %category, "classified");
            category
        })
        .collect();

    Classification {
        categories,
        failures,
    }
}

/// `None` stands for a reference that could not be fetched. Existence decides first,
/// then obsolete status, then size.
pub fn categorize(
    id: &PdbId,
    exists: Option<bool>,
    obsolete: Option<&IdSet>,
    large: Option<&IdSet>,
) -> Category {
    match exists {
        None => return Category::Indeterminate,
        Some(false) => return Category::Invalid,
        Some(true) => {}
    }
    let Some(obsolete) = obsolete else {
        return Category::Indeterminate;
    };
    if obsolete.contains(id) {
        return Category::Obsolete;
    }
    let Some(large) = large else {
        return Category::Indeterminate;
    };
    if large.contains(id) {
        return Category::Large;
    }
    Category::Standard
}

fn record<T>(
    index: RemoteIndex,
    result: Result<T, KiraError>,
    failures: &mut Vec<IndexFailure>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(?index, error = %err, "remote index unavailable");
            failures.push(IndexFailure {
                index,
                message: err.to_string(),
            });
            None
        }
    }
}
