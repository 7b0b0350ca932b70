use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

/// Canonical (uppercase) four-character PDB identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PdbId(String);

impl PdbId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Two-character directory segment the archive uses to partition entries:
    /// the lowercase second and third characters (`4HHB` -> `hh`).
    pub fn shard(&self) -> String {
        self.0[1..3].to_ascii_lowercase()
    }
}

impl fmt::Display for PdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PdbId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        let is_valid =
            normalized.len() == 4 && normalized.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(KiraError::InvalidProteinId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Standard,
    Large,
    Obsolete,
    Invalid,
    /// A reference fetch failed, so the entry could not be placed.
    Indeterminate,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Standard => write!(f, "standard"),
            Category::Large => write!(f, "large"),
            Category::Obsolete => write!(f, "obsolete"),
            Category::Invalid => write!(f, "invalid"),
            Category::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseFormat {
    #[default]
    Pdb,
    Mmcif,
    Pdbml,
}

impl BaseFormat {
    /// Directory name of this representation inside `divided/` and `obsolete/`.
    pub fn archive_dir(self) -> &'static str {
        match self {
            BaseFormat::Pdb => "pdb",
            BaseFormat::Mmcif => "mmCIF",
            BaseFormat::Pdbml => "XML",
        }
    }

    pub fn remote_file_name(self, id: &PdbId) -> String {
        let lower = id.to_lowercase();
        match self {
            BaseFormat::Pdb => format!("pdb{lower}.ent.gz"),
            BaseFormat::Mmcif => format!("{lower}.cif.gz"),
            BaseFormat::Pdbml => format!("{lower}.xml.gz"),
        }
    }

    pub fn local_ext(self) -> &'static str {
        match self {
            BaseFormat::Pdb => "pdb",
            BaseFormat::Mmcif => "cif",
            BaseFormat::Pdbml => "xml",
        }
    }
}

impl fmt::Display for BaseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseFormat::Pdb => write!(f, "pdb"),
            BaseFormat::Mmcif => write!(f, "mmcif"),
            BaseFormat::Pdbml => write!(f, "pdbml"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadFormat {
    #[default]
    Pdb,
    Mmcif,
    Pdbml,
    PdbGz,
    MmcifGz,
    PdbmlGz,
}

impl DownloadFormat {
    pub fn new(base: BaseFormat, compressed: bool) -> Self {
        match (base, compressed) {
            (BaseFormat::Pdb, false) => DownloadFormat::Pdb,
            (BaseFormat::Mmcif, false) => DownloadFormat::Mmcif,
            (BaseFormat::Pdbml, false) => DownloadFormat::Pdbml,
            (BaseFormat::Pdb, true) => DownloadFormat::PdbGz,
            (BaseFormat::Mmcif, true) => DownloadFormat::MmcifGz,
            (BaseFormat::Pdbml, true) => DownloadFormat::PdbmlGz,
        }
    }

    pub fn base(self) -> BaseFormat {
        match self {
            DownloadFormat::Pdb | DownloadFormat::PdbGz => BaseFormat::Pdb,
            DownloadFormat::Mmcif | DownloadFormat::MmcifGz => BaseFormat::Mmcif,
            DownloadFormat::Pdbml | DownloadFormat::PdbmlGz => BaseFormat::Pdbml,
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            DownloadFormat::PdbGz | DownloadFormat::MmcifGz | DownloadFormat::PdbmlGz
        )
    }
}

/// Per-invocation download options, built once from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DownloadPolicy {
    pub format: DownloadFormat,
    pub include_large: bool,
    pub include_obsolete: bool,
}

impl DownloadPolicy {
    pub fn new(
        base: BaseFormat,
        compressed: bool,
        include_large: bool,
        include_obsolete: bool,
    ) -> Self {
        Self {
            format: DownloadFormat::new(base, compressed),
            include_large,
            include_obsolete,
        }
    }

    pub fn compressed(&self) -> bool {
        self.format.is_compressed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalOutcome {
    AlreadyPresent,
    Downloaded,
    /// Transferred, but the archive could not be decompressed; the `.gz` is kept.
    PartiallyDownloaded,
    Failed,
    SkippedLarge,
    SkippedObsolete,
    Invalid,
    Unresolved,
    Cancelled,
}
