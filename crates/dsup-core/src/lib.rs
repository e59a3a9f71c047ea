//! Core of the download supervisor: job store, in-memory board, process
//! registry, downloader supervision and the control API on top.

pub mod board;
pub mod config;
pub mod control;
pub mod job_db;
pub mod logging;
pub mod registry;
pub mod supervisor;

pub use control::{DownloadManager, ManagerSettings};
