//! Copy every frame into an in-memory stack.

use crate::error::{Error, Result};
use pco_driver::{Frame, FrameConsumer, TransferPlan};
use pco_storage::FrameStack;
use tracing::debug;

/// Collects delivered frames into a [`FrameStack`].
///
/// The stack is sized from the transfer plan, so it is allocated once the
/// segment geometry is known and never grows.
#[derive(Debug, Default)]
pub struct RawCopy {
    stack: FrameStack,
}

impl RawCopy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected frames, cut down to the `delivered` count the engine
    /// reported.
    pub fn into_stack(self, delivered: usize) -> FrameStack {
        let mut stack = self.stack;
        stack.truncate(delivered);
        stack
    }
}

impl FrameConsumer for RawCopy {
    type Error = Error;

    fn on_start(&mut self, plan: &TransferPlan) -> Result<()> {
        debug!(frames = plan.frames, geometry = %plan.geometry, "Allocating frame stack");
        self.stack = FrameStack::new(plan.geometry, plan.frames);
        Ok(())
    }

    fn on_frame(&mut self, index: usize, frame: Frame<'_>) -> Result<()> {
        self.stack.write_frame(index, frame.pixels())?;
        Ok(())
    }
}
