//! Streaming multi-page TIFF output with size-ceiling rollover.
//!
//! Classic TIFF addresses its contents with 32-bit offsets, so one file can
//! never exceed 4 GiB. [`TiffStackWriter`] keeps a conservative running
//! estimate of each file's size and, before a frame would push it past
//! [`ContainerLimits::max_file_bytes`], closes the file and continues the
//! same logical stream in a numbered sibling:
//!
//! ```text
//! run.tif    frames 0..k
//! run_1.tif  frames k..2k
//! run_2.tif  ...
//! ```

use crate::error::StorageError;
use pco_driver::FrameGeometry;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tiff::encoder::{colortype, TiffEncoder};
use tracing::{debug, error, info};

/// Hard addressing limit of a classic TIFF file.
pub const TIFF_ADDRESS_LIMIT: u64 = 1 << 32;
/// Default size ceiling per file: 3 GiB, well clear of the addressing limit.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 3 * 1024 * 1024 * 1024;
/// Default per-frame allowance for tags and directory entries.
pub const DEFAULT_FRAME_OVERHEAD_BYTES: u64 = 4096;
/// Smallest per-frame allowance that covers one page directory and its tags.
pub const MIN_FRAME_OVERHEAD_BYTES: u64 = 512;
/// Room kept between the size ceiling and [`TIFF_ADDRESS_LIMIT`] for the
/// file header and estimate drift.
pub const TIFF_HEADROOM_BYTES: u64 = 16 * 1024 * 1024;

/// Size accounting for one physical output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerLimits {
    /// Estimated bytes a file may reach before the stream rolls over.
    pub max_file_bytes: u64,
    /// Estimated metadata bytes added per frame on top of the pixel data.
    pub frame_overhead_bytes: u64,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            frame_overhead_bytes: DEFAULT_FRAME_OVERHEAD_BYTES,
        }
    }
}

impl ContainerLimits {
    /// Estimated on-disk cost of one frame.
    pub fn frame_cost(&self, geometry: FrameGeometry) -> u64 {
        geometry
            .frame_bytes()
            .saturating_add(self.frame_overhead_bytes)
    }
}

/// Name of rollover file `number` of a stream written to `path`.
///
/// `_<number>` goes in front of the extension of the final path component,
/// or at the end when there is none: `run.tif` becomes `run_1.tif`,
/// `archive.tar.gz` becomes `archive.tar_1.gz` and `run` becomes `run_1`.
pub fn numbered_path(path: &Path, number: u32) -> PathBuf {
    let suffix = format!("_{number}");
    let Some(stem) = path.file_stem() else {
        let mut name = path.as_os_str().to_owned();
        name.push(&suffix);
        return PathBuf::from(name);
    };

    let mut name = stem.to_owned();
    name.push(&suffix);
    if let Some(extension) = path.extension() {
        name.push(".");
        name.push(extension);
    }
    path.with_file_name(name)
}

/// One physical file of a stream and the frames it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFile {
    pub path: PathBuf,
    pub frames: usize,
}

/// Files produced by a [`TiffStackWriter`], in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSummary {
    pub files: Vec<ContainerFile>,
}

impl ContainerSummary {
    pub fn total_frames(&self) -> usize {
        self.files.iter().map(|f| f.frames).sum()
    }
}

struct OpenFile {
    path: PathBuf,
    encoder: TiffEncoder<File>,
    /// Second handle on the same file, used to sync it once the encoder is done.
    handle: File,
    frames: usize,
    bytes: u64,
}

impl OpenFile {
    fn create(path: PathBuf) -> Result<Self, StorageError> {
        let opened = File::create(&path).and_then(|file| {
            let handle = file.try_clone()?;
            Ok((file, handle))
        });
        let (file, handle) = match opened {
            Ok(files) => files,
            Err(source) => return Err(StorageError::Create { path, source }),
        };
        let encoder = match TiffEncoder::new(file) {
            Ok(encoder) => encoder,
            Err(source) => return Err(StorageError::Encode { path, source }),
        };
        debug!(path = %path.display(), "Opened TIFF file");
        Ok(Self {
            path,
            encoder,
            handle,
            frames: 0,
            bytes: 0,
        })
    }
}

enum WriterState {
    /// Nothing written yet; no file exists.
    Unopened,
    Open(OpenFile),
    /// Finished, or closed by a failure.
    Closed,
}

/// Writes a stream of 16-bit grayscale frames as multi-page TIFF.
///
/// The first frame opens the file and fixes the geometry for the whole
/// stream. Open files are finalized by [`finish`](Self::finish) or, failing
/// that, on drop; either way exactly once. A stream that never receives a
/// frame creates no file.
///
/// Not for concurrent use: frames must come from one caller, in order.
pub struct TiffStackWriter {
    path: PathBuf,
    limits: ContainerLimits,
    geometry: Option<FrameGeometry>,
    state: WriterState,
    file_number: u32,
    closed_files: Vec<ContainerFile>,
}

impl TiffStackWriter {
    /// Writer for `path` with the default size ceiling. Nothing is created yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_limits(path, ContainerLimits::default())
    }

    pub fn with_limits(path: impl Into<PathBuf>, limits: ContainerLimits) -> Self {
        Self {
            path: path.into(),
            limits,
            geometry: None,
            state: WriterState::Unopened,
            file_number: 0,
            closed_files: Vec::new(),
        }
    }

    /// Logical output path; rollover files are derived from it.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limits(&self) -> ContainerLimits {
        self.limits
    }

    /// Geometry fixed by the first frame, if any was written.
    pub fn geometry(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    /// Append one frame of `geometry` to the stream.
    ///
    /// Opens the first file on the first call and rolls over to the next
    /// numbered file when this frame would take the current one past the
    /// ceiling. A frame larger than the ceiling on its own still gets written,
    /// alone in its file.
    ///
    /// A frame whose geometry differs from the first one finalizes the open
    /// file and closes the stream; later writes fail with
    /// [`StorageError::Closed`].
    pub fn write_frame(
        &mut self,
        geometry: FrameGeometry,
        pixels: &[u16],
    ) -> Result<(), StorageError> {
        if pixels.len() != geometry.pixel_count() {
            return Err(StorageError::FrameLength {
                expected: geometry.pixel_count(),
                actual: pixels.len(),
            });
        }
        if let Some(expected) = self.geometry {
            if expected != geometry {
                error!(
                    %expected,
                    actual = %geometry,
                    "Frame geometry changed mid-stream, closing stream"
                );
                let state = std::mem::replace(&mut self.state, WriterState::Closed);
                if let WriterState::Open(file) = state {
                    if let Err(e) = self.close_file(file) {
                        error!(error = %e, "Failed to finalize file after geometry change");
                    }
                }
                return Err(StorageError::GeometryMismatch {
                    expected,
                    actual: geometry,
                });
            }
        }

        let cost = self.limits.frame_cost(geometry);
        let state = std::mem::replace(&mut self.state, WriterState::Closed);
        let mut file = match state {
            WriterState::Unopened => {
                let file = OpenFile::create(self.path.clone())?;
                self.geometry = Some(geometry);
                file
            }
            WriterState::Open(file)
                if file.frames > 0
                    && file.bytes.saturating_add(cost) > self.limits.max_file_bytes =>
            {
                let frames = file.frames;
                self.close_file(file)?;
                self.file_number += 1;
                let next = numbered_path(&self.path, self.file_number);
                info!(
                    frames_in_previous = frames,
                    next = %next.display(),
                    "Size ceiling reached, rolling over"
                );
                OpenFile::create(next)?
            }
            WriterState::Open(file) => file,
            WriterState::Closed => return Err(StorageError::Closed),
        };

        if let Err(source) =
            file.encoder
                .write_image::<colortype::Gray16>(geometry.width, geometry.height, pixels)
        {
            let path = file.path.clone();
            error!(path = %path.display(), error = %source, "Writing frame failed, closing file");
            if let Err(e) = self.close_file(file) {
                error!(error = %e, "Failed to finalize file after write error");
            }
            return Err(StorageError::Encode { path, source });
        }

        file.frames += 1;
        file.bytes += cost;
        self.state = WriterState::Open(file);
        Ok(())
    }

    /// Frames written so far across all files.
    pub fn frames_written(&self) -> usize {
        let open = match &self.state {
            WriterState::Open(file) => file.frames,
            _ => 0,
        };
        self.closed_files.iter().map(|f| f.frames).sum::<usize>() + open
    }

    /// Files written so far, including the one still open.
    pub fn summary(&self) -> ContainerSummary {
        let mut files = self.closed_files.clone();
        if let WriterState::Open(file) = &self.state {
            files.push(ContainerFile {
                path: file.path.clone(),
                frames: file.frames,
            });
        }
        ContainerSummary { files }
    }

    /// Finalize the open file and report what was written.
    ///
    /// Calling it again returns the same summary without touching any file.
    /// Later writes fail with [`StorageError::Closed`].
    pub fn finish(&mut self) -> Result<ContainerSummary, StorageError> {
        let state = std::mem::replace(&mut self.state, WriterState::Closed);
        if let WriterState::Open(file) = state {
            self.close_file(file)?;
        }
        Ok(self.summary())
    }

    fn close_file(&mut self, file: OpenFile) -> Result<(), StorageError> {
        let OpenFile {
            path,
            encoder,
            handle,
            frames,
            bytes,
        } = file;
        drop(encoder);
        let synced = handle.sync_all();
        debug!(path = %path.display(), frames, estimated_bytes = bytes, "Closed TIFF file");
        self.closed_files.push(ContainerFile {
            path: path.clone(),
            frames,
        });
        synced.map_err(|source| StorageError::Finalize { path, source })
    }
}

impl Drop for TiffStackWriter {
    fn drop(&mut self) {
        let state = std::mem::replace(&mut self.state, WriterState::Closed);
        if let WriterState::Open(file) = state {
            if let Err(e) = self.close_file(file) {
                error!(error = %e, "Failed to finalize TIFF file on drop");
            }
        }
    }
}
