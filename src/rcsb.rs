use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::config::Settings;
use crate::domain::PdbId;
use crate::error::KiraError;

pub type IdSet = HashSet<PdbId>;

/// Remote reference lists and the batched existence query.
pub trait RcsbClient: Send + Sync {
    fn fetch_obsolete_ids(&self) -> Result<IdSet, KiraError>;
    fn fetch_large_ids(&self) -> Result<IdSet, KiraError>;
    /// One boolean per input identifier, in input order.
    fn check_existence(&self, ids: &[PdbId]) -> Result<Vec<bool>, KiraError>;
}

#[derive(Clone)]
pub struct RcsbHttpClient {
    client: Client,
    archive_base_url: String,
    data_api_url: String,
}

impl RcsbHttpClient {
    pub fn new(settings: &Settings) -> Result<Self, KiraError> {
        let agent = format!("kira-pdb/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .default_headers(agent_headers(&agent, KiraError::RcsbHttp)?)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| KiraError::RcsbHttp(err.to_string()))?;
        Ok(Self {
            client,
            archive_base_url: settings.archive_base_url.clone(),
            data_api_url: settings.data_api_url.clone(),
        })
    }

    pub fn obsolete_index_url(&self) -> String {
        format!("{}/data/status/obsolete.dat", self.archive_base_url)
    }

    pub fn bundle_index_url(&self) -> String {
        format!(
            "{}/compatible/pdb_bundle/pdb_bundle_index.txt",
            self.archive_base_url
        )
    }

    pub fn holdings_url(&self, ids: &[PdbId]) -> String {
        let joined = ids.iter().map(PdbId::as_str).collect::<Vec<_>>().join(",");
        format!("{}/holdings/status?ids={joined}", self.data_api_url)
    }

    fn get_text(&self, url: &str) -> Result<String, KiraError> {
        debug!(url, "rcsb.request");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| KiraError::RcsbHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .text()
            .map_err(|err| KiraError::RcsbHttp(err.to_string()))
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, KiraError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "RCSB request failed".to_string());
        Err(KiraError::RcsbStatus { status, message })
    }
}

impl RcsbClient for RcsbHttpClient {
    fn fetch_obsolete_ids(&self) -> Result<IdSet, KiraError> {
        let body = self.get_text(&self.obsolete_index_url())?;
        Ok(parse_obsolete_index(&body))
    }

    fn fetch_large_ids(&self) -> Result<IdSet, KiraError> {
        let body = self.get_text(&self.bundle_index_url())?;
        Ok(parse_bundle_index(&body))
    }

    fn check_existence(&self, ids: &[PdbId]) -> Result<Vec<bool>, KiraError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.holdings_url(ids);
        debug!(url = %url, count = ids.len(), "rcsb.request");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| KiraError::RcsbHttp(err.to_string()))?;
        // The holdings service answers 404 when none of the identifiers is known.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(vec![false; ids.len()]);
        }
        let body = Self::handle_status(response)?
            .text()
            .map_err(|err| KiraError::RcsbHttp(err.to_string()))?;
        let known = parse_holdings_status(&body)?;
        Ok(ids.iter().map(|id| known.contains(id)).collect())
    }
}

/// Default headers shared by both HTTP clients; `wrap` picks the client's error variant.
pub(crate) fn agent_headers(
    agent: &str,
    wrap: fn(String) -> KiraError,
) -> Result<HeaderMap, KiraError> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(agent).map_err(|err| wrap(err.to_string()))?;
    headers.insert(USER_AGENT, value);
    Ok(headers)
}

fn structure_id_attr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"structureId\s*=\s*"([0-9A-Za-z]{4})""#).expect("static regex is valid")
    })
}

/// Accepts `obsolete.dat` records (`OBSLTE <date> <old> <new>...`), the legacy
/// `<PDB structureId="..."/>` markup listing, and bare one-identifier lines.
/// Successor identifiers on `OBSLTE` lines are not obsolete and are ignored.
pub fn parse_obsolete_index(body: &str) -> IdSet {
    let mut ids = IdSet::new();
    for line in body.lines() {
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        match tokens.as_slice() {
            [] => {}
            [tag, _date, obsolete, ..] if tag.eq_ignore_ascii_case("OBSLTE") => {
                if let Ok(id) = obsolete.parse::<PdbId>() {
                    ids.insert(id);
                }
            }
            [single] => {
                if let Ok(id) = single.parse::<PdbId>() {
                    ids.insert(id);
                }
            }
            _ => {
                for capture in structure_id_attr().captures_iter(line) {
                    if let Ok(id) = capture[1].parse::<PdbId>() {
                        ids.insert(id);
                    }
                }
            }
        }
    }
    ids
}

/// One identifier per line; anything that is not a well-formed identifier is noise.
pub fn parse_bundle_index(body: &str) -> IdSet {
    body.lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|token| token.parse::<PdbId>().ok())
        .collect()
}

#[derive(Debug, Deserialize)]
struct HoldingsRecord {
    rcsb_id: String,
    #[serde(default)]
    rcsb_repository_holdings_combined: Option<CombinedHoldings>,
}

#[derive(Debug, Deserialize)]
struct CombinedHoldings {
    #[serde(default)]
    status: Option<String>,
}

/// Identifiers the archive knows as released (`CURRENT`) or superseded (`REMOVED`).
pub fn parse_holdings_status(body: &str) -> Result<IdSet, KiraError> {
    let records: Vec<HoldingsRecord> =
        serde_json::from_str(body).map_err(|err| KiraError::RcsbResponse(err.to_string()))?;
    Ok(records
        .into_iter()
        .filter(|record| {
            record
                .rcsb_repository_holdings_combined
                .as_ref()
                .and_then(|holdings| holdings.status.as_deref())
                .map(|status| matches!(status, "CURRENT" | "REMOVED"))
                .unwrap_or(true)
        })
        .filter_map(|record| record.rcsb_id.parse::<PdbId>().ok())
        .collect())
}
