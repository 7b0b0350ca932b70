pub mod app;
pub mod archive;
pub mod classify;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod rcsb;
pub mod router;
