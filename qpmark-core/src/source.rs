//! Frame sources for extraction sessions.
//!
//! A source is any iterator of `Result<Frame>`; the types here cover a
//! directory of still frames and in-memory frames.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::frame::Frame;

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Decoded frames of a directory of PNG/JPEG stills, in file name order.
///
/// Frames are decoded lazily, one per `next` call.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequence {
    /// List the frame files in `dir`. Fails with
    /// [`Error::SourceUnavailable`] when the directory cannot be read.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir)
            .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", dir.display())))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", dir.display())))?
                .path();
            if path.is_file() && is_frame_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        debug!("{}: {} frame files", dir.display(), paths.len());
        Ok(Self { paths, next: 0 })
    }

    /// Frame files found, including ones already read.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Iterator for ImageSequence {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.get(self.next)?;
        let index = self.next as u32;
        self.next += 1;
        Some(
            image::open(path)
                .map(|image| Frame::from_image(index, image))
                .map_err(Error::from),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.paths.len() - self.next;
        (remaining, Some(remaining))
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Frames held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    frames: std::vec::IntoIter<Frame>,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl Iterator for VecSource {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.frames.next().map(Ok)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.frames.size_hint()
    }
}
