//! Storage error types.

use pco_driver::FrameGeometry;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// A frame does not match the geometry fixed by the first frame of the stream.
    #[error("Frame geometry {actual} does not match stream geometry {expected}")]
    GeometryMismatch {
        expected: FrameGeometry,
        actual: FrameGeometry,
    },

    #[error("Could not create output file {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Writing frame to {} failed: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("Flushing {} failed: {source}", path.display())]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The writer was finished, or an earlier encode failure closed it.
    #[error("Output stream is closed")]
    Closed,

    #[error("Frame index {index} is outside a stack of {capacity} frames")]
    StackIndex { index: usize, capacity: usize },

    #[error("Frame holds {actual} pixels, expected {expected}")]
    FrameLength { expected: usize, actual: usize },
}
