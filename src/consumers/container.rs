//! Stream frames straight into a TIFF stack.

use crate::error::{Error, Result};
use pco_driver::{Frame, FrameConsumer};
use pco_storage::TiffStackWriter;

/// Forwards each frame to a [`TiffStackWriter`].
pub struct ContainerSink {
    writer: TiffStackWriter,
}

impl ContainerSink {
    pub fn new(writer: TiffStackWriter) -> Self {
        Self { writer }
    }

    pub fn writer(&self) -> &TiffStackWriter {
        &self.writer
    }

    pub fn into_writer(self) -> TiffStackWriter {
        self.writer
    }
}

impl FrameConsumer for ContainerSink {
    type Error = Error;

    fn on_frame(&mut self, _index: usize, frame: Frame<'_>) -> Result<()> {
        self.writer.write_frame(frame.geometry(), frame.pixels())?;
        Ok(())
    }
}
