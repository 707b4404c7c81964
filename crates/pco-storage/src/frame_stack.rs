//! Contiguous in-memory frame stack.

use crate::error::StorageError;
use pco_driver::FrameGeometry;

/// Pre-sized block of `capacity` frames of one geometry, stored back to back.
///
/// Frames are written by index. The logical length is one past the highest
/// index written and can be cut back with [`truncate`](Self::truncate); the
/// allocation itself keeps its full capacity until the stack is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStack {
    geometry: FrameGeometry,
    capacity: usize,
    len: usize,
    pixels: Vec<u16>,
}

impl FrameStack {
    /// Zero-filled stack for `capacity` frames.
    pub fn new(geometry: FrameGeometry, capacity: usize) -> Self {
        Self {
            geometry,
            capacity,
            len: 0,
            pixels: vec![0; capacity * geometry.pixel_count()],
        }
    }

    /// Copy one frame into slot `index`.
    pub fn write_frame(&mut self, index: usize, pixels: &[u16]) -> Result<(), StorageError> {
        if index >= self.capacity {
            return Err(StorageError::StackIndex {
                index,
                capacity: self.capacity,
            });
        }
        let frame_len = self.geometry.pixel_count();
        if pixels.len() != frame_len {
            return Err(StorageError::FrameLength {
                expected: frame_len,
                actual: pixels.len(),
            });
        }

        let start = index * frame_len;
        self.pixels[start..start + frame_len].copy_from_slice(pixels);
        self.len = self.len.max(index + 1);
        Ok(())
    }

    /// Frame `index`, if it is within the logical length.
    pub fn frame(&self, index: usize) -> Option<&[u16]> {
        if index >= self.len {
            return None;
        }
        let frame_len = self.geometry.pixel_count();
        let start = index * frame_len;
        Some(&self.pixels[start..start + frame_len])
    }

    /// Shorten the logical length to at most `len` frames.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Frames held.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Frames the allocation can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pixels of the held frames, frame after frame.
    pub fn as_slice(&self) -> &[u16] {
        &self.pixels[..self.len * self.geometry.pixel_count()]
    }

    /// Iterate over the held frames in index order.
    pub fn iter(&self) -> impl Iterator<Item = &[u16]> + '_ {
        self.as_slice()
            .chunks_exact(self.geometry.pixel_count().max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_truncate() {
        let mut stack = FrameStack::new(FrameGeometry::new(2, 1), 4);
        assert!(stack.is_empty());

        stack.write_frame(0, &[1, 2]).unwrap();
        stack.write_frame(1, &[3, 4]).unwrap();
        stack.write_frame(2, &[5, 6]).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.capacity(), 4);
        assert_eq!(stack.frame(1), Some(&[3u16, 4][..]));
        assert_eq!(stack.frame(3), None);

        stack.truncate(2);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(stack.iter().count(), 2);

        // Truncate never grows.
        stack.truncate(10);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_rejects_bad_index_and_length() {
        let mut stack = FrameStack::new(FrameGeometry::new(2, 2), 1);
        assert!(matches!(
            stack.write_frame(1, &[0; 4]),
            Err(StorageError::StackIndex {
                index: 1,
                capacity: 1
            })
        ));
        assert!(matches!(
            stack.write_frame(0, &[0; 3]),
            Err(StorageError::FrameLength {
                expected: 4,
                actual: 3
            })
        ));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_default_is_empty() {
        let stack = FrameStack::default();
        assert_eq!(stack.len(), 0);
        assert_eq!(stack.iter().count(), 0);
        assert!(stack.as_slice().is_empty());
    }
}
