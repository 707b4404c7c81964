//! Error types for device access and segment transfers.
//!
//! Every error here is fatal to the transfer that raised it. Nothing is
//! retried; the engine runs its cleanup (cancel in-flight transfers, free the
//! buffers) and hands the error back to the caller.

use crate::device::TransferStatus;
use thiserror::Error;

/// A failed device call, carrying the driver's own diagnostic text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (0x{code:08x})")]
pub struct DeviceError {
    /// Driver error code.
    pub code: u32,
    /// Human-readable text as reported by the driver.
    pub message: String,
}

impl DeviceError {
    /// Build an error from a driver code and its text.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors raised by [`TransferEngine`](crate::TransferEngine).
#[derive(Error, Debug)]
pub enum TransferError {
    /// A device query or command reported a non-success status.
    #[error("Device error during {operation}: {source}")]
    Device {
        operation: &'static str,
        #[source]
        source: DeviceError,
    },

    /// The completion wait itself failed.
    #[error("Waiting for device frame {frame} failed: {source}")]
    Wait {
        frame: u32,
        #[source]
        source: DeviceError,
    },

    /// The buffer completed but the driver reported a bad status.
    #[error("Buffer for device frame {frame} completed with error status {status}")]
    BufferStatus { frame: u32, status: TransferStatus },

    /// A completed buffer does not hold exactly one frame of the segment geometry.
    #[error("Buffer holds {actual} pixels, segment geometry needs {expected}")]
    BufferSize { expected: usize, actual: usize },
}

impl TransferError {
    pub(crate) fn device(operation: &'static str) -> impl FnOnce(DeviceError) -> Self {
        move |source| Self::Device { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_display() {
        let err = DeviceError::new(0x8000_2001, "No camera connected");
        assert_eq!(err.to_string(), "No camera connected (0x80002001)");
    }

    #[test]
    fn test_transfer_error_keeps_device_text() {
        let err = TransferError::device("allocate buffer")(DeviceError::new(7, "out of memory"));
        let text = err.to_string();
        assert!(text.contains("allocate buffer"));
        assert!(text.contains("out of memory"));
    }

    #[test]
    fn test_buffer_status_display() {
        let err = TransferError::BufferStatus {
            frame: 12,
            status: TransferStatus::new(0, 0x8000_0010),
        };
        assert_eq!(
            err.to_string(),
            "Buffer for device frame 12 completed with error status 0x80000010"
        );
    }
}
