//! Lazy, forward-only sequence of rendered frames.

use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{Error, Result};
use crate::pipeline::FramePipeline;
use crate::Progress;

/// Stream properties reported by a source once opened.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Native frame rate, when the container reports one.
    pub fps: Option<f64>,
    /// Number of frames, when the container reports one.
    pub frame_count: Option<u64>,
}

/// An open video stream, read front to back.
///
/// Dropping the source releases whatever it holds (process, file handle).
pub trait VideoSource {
    fn info(&self) -> SourceInfo;

    /// Next frame in native order, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Opens [`VideoSource`]s by path.
pub trait SourceOpener {
    type Source: VideoSource;

    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] if the path cannot be opened as video.
    fn open(&self, path: &Path) -> Result<Self::Source>;
}

impl<O: SourceOpener> SourceOpener for &O {
    type Source = O::Source;

    fn open(&self, path: &Path) -> Result<Self::Source> {
        (**self).open(path)
    }
}

/// Callback receiving one [`Progress`] per retained frame.
pub type ProgressFn<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

enum State<S> {
    Pending,
    Open(S),
    Done,
}

/// Iterator over rendered frames of one source video.
///
/// Nothing is opened until the first call to `next`. Every `frame_skip`-th
/// source frame (counting from 0) is pushed through the [`FramePipeline`].
/// The source is dropped, and with it released, as soon as the stream ends,
/// an error occurs, or the sequence itself is dropped.
pub struct FrameSequence<'a, O: SourceOpener> {
    path: PathBuf,
    opener: O,
    pipeline: FramePipeline,
    frame_skip: u64,
    batch_size: usize,
    progress: Option<ProgressFn<'a>>,
    state: State<O::Source>,
    next_index: u64,
    info: Option<SourceInfo>,
    ready: VecDeque<RgbImage>,
}

impl<'a, O: SourceOpener> FrameSequence<'a, O> {
    /// Prepare a sequence over `path`. Does not touch the file.
    pub fn new(path: impl Into<PathBuf>, opener: O, pipeline: FramePipeline, frame_skip: u32) -> Self {
        Self {
            path: path.into(),
            opener,
            pipeline,
            frame_skip: u64::from(frame_skip.max(1)),
            batch_size: 1,
            progress: None,
            state: State::Pending,
            next_index: 0,
            info: None,
            ready: VecDeque::new(),
        }
    }

    /// Report "Processing frame k/total" before each retained frame.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'a,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Render up to `size` retained frames at a time in parallel. Output order
    /// is unchanged.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Stream properties, available once the first pull opened the source.
    pub fn source_info(&self) -> Option<SourceInfo> {
        self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn source(&mut self) -> Result<Option<&mut O::Source>> {
        if let State::Pending = self.state {
            let source = self.opener.open(&self.path)?;
            let info = source.info();
            log::info!(
                "opened {}: {}x{} fps={:?} frames={:?}",
                self.path.display(),
                info.width,
                info.height,
                info.fps,
                info.frame_count
            );
            if info.frame_count.is_none() {
                log::warn!("{}: total frame count unknown", self.path.display());
            }
            self.info = Some(info);
            self.state = State::Open(source);
        }
        match &mut self.state {
            State::Open(source) => Ok(Some(source)),
            _ => Ok(None),
        }
    }

    fn release(&mut self) {
        if let State::Open(_) = self.state {
            log::debug!("releasing {}", self.path.display());
        }
        self.state = State::Done;
    }

    fn pull_retained(&mut self) -> Result<Option<RgbImage>> {
        loop {
            let Some(source) = self.source()? else {
                return Ok(None);
            };
            let Some(frame) = source.next_frame()? else {
                self.release();
                return Ok(None);
            };

            let index = self.next_index;
            self.next_index += 1;
            if index % self.frame_skip != 0 {
                continue;
            }

            let total = self.info.and_then(|i| i.frame_count).unwrap_or(0);
            if let Some(callback) = &self.progress {
                callback(Progress::processing_frame(index as usize, total as usize));
            }
            log::debug!("Processing frame {index}");
            return Ok(Some(frame));
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut pending = Vec::with_capacity(self.batch_size);
        while pending.len() < self.batch_size {
            match self.pull_retained()? {
                Some(frame) => pending.push(frame),
                None => break,
            }
        }

        match pending.len() {
            0 => {}
            1 => {
                let rendered = self.pipeline.render(&pending[0])?;
                self.ready.push_back(rendered);
            }
            _ => self.ready.extend(self.pipeline.render_batch(&pending)?),
        }
        Ok(())
    }
}

impl<O: SourceOpener> Iterator for FrameSequence<'_, O> {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(frame) = self.ready.pop_front() {
            return Some(Ok(frame));
        }
        if let State::Done = self.state {
            return None;
        }
        match self.fill() {
            Ok(()) => self.ready.pop_front().map(Ok),
            Err(e) => {
                log::error!("{}: {e}", self.path.display());
                self.release();
                Some(Err(e))
            }
        }
    }
}

impl<O: SourceOpener> FusedIterator for FrameSequence<'_, O> {}

/// Render only the first frame of `path`, opening and releasing the source.
///
/// # Errors
///
/// [`Error::SourceUnavailable`] if the source cannot be opened, or it has no
/// frames, plus any pipeline error.
pub fn render_first_frame<O: SourceOpener>(path: &Path, opener: &O, pipeline: &FramePipeline) -> Result<RgbImage> {
    let mut source = opener.open(path)?;
    let frame = source
        .next_frame()?
        .ok_or_else(|| Error::source_unavailable(path, "no frames"))?;
    drop(source);
    pipeline.render(&frame)
}
