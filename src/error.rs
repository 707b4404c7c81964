//! Error type for segment transfers and their outputs.
//!
//! `Error` consolidates everything a transfer request can fail with:
//!
//! - **`Transfer`**: device and buffer failures raised by the transfer engine.
//!   These carry the device's own diagnostic text.
//! - **`Storage`**: frame stack and TIFF output failures, including a frame
//!   whose geometry differs from the rest of its stream.
//! - **`InvalidRequest`**: a request that cannot be carried out as asked,
//!   such as a MIP window of zero frames.
//! - **`Config`**: configuration could not be loaded or failed validation.
//!
//! All of them are fatal to the request that raised them. Nothing is retried.

use crate::config::ConfigError;
use pco_driver::TransferError;
use pco_storage::StorageError;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid transfer request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
