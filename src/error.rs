use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid PDB identifier: {0}")]
    InvalidProteinId(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("RCSB request failed: {0}")]
    RcsbHttp(String),

    #[error("RCSB returned status {status}: {message}")]
    RcsbStatus { status: u16, message: String },

    #[error("unexpected RCSB response: {0}")]
    RcsbResponse(String),

    #[error("PDB archive request failed: {0}")]
    ArchiveHttp(String),

    #[error("PDB archive returned status {status} for {url}")]
    ArchiveStatus { status: u16, url: String },

    #[error("failed to decompress {path}: {message}")]
    Decompression { path: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("failed to install interrupt handler: {0}")]
    InterruptHandler(String),
}

impl KiraError {
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            KiraError::RcsbHttp(_)
                | KiraError::RcsbStatus { .. }
                | KiraError::RcsbResponse(_)
                | KiraError::ArchiveHttp(_)
                | KiraError::ArchiveStatus { .. }
        )
    }
}
