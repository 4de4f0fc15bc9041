//! Video I/O through `ffmpeg`/`ffprobe` subprocesses.
//!
//! Decoding pipes raw `rgb24` frames out of `ffmpeg`; encoding pipes them back
//! in and lets `ffmpeg` write an H.264 MP4. Both binaries must be on `PATH`
//! (or configured explicitly).

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use image::RgbImage;

use crate::error::{Error, Result};
use crate::sequence::{SourceInfo, SourceOpener, VideoSource};

/// Output file for `source`: `<file name>_ASCII.mp4` in the same directory.
///
/// ```
/// use asciivid::output_path_for;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(output_path_for(Path::new("/clips/cat.mov")), PathBuf::from("/clips/cat.mov_ASCII.mp4"));
/// ```
pub fn output_path_for(source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    source.with_file_name(format!("{name}_ASCII.mp4"))
}

/// True if both `ffmpeg -version` and `ffprobe -version` run.
pub fn ffmpeg_available() -> bool {
    ["ffmpeg", "ffprobe"].into_iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    })
}

/// Parse `ffprobe -of default=noprint_wrappers=1` output for the first video
/// stream. Returns `None` without a usable width and height.
pub fn parse_probe_output(text: &str) -> Option<SourceInfo> {
    let mut info = SourceInfo::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "width" => info.width = value.parse().unwrap_or(0),
            "height" => info.height = value.parse().unwrap_or(0),
            "r_frame_rate" => {
                // "24/1", "30000/1001"
                let mut parts = value.splitn(2, '/');
                let num: Option<f64> = parts.next().and_then(|s| s.parse().ok());
                let den: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1.0);
                info.fps = num.filter(|n| *n > 0.0 && den > 0.0).map(|n| n / den);
            }
            "nb_frames" => info.frame_count = value.parse().ok().filter(|n| *n > 0),
            _ => {}
        }
    }
    (info.width > 0 && info.height > 0).then_some(info)
}

/// Opens videos by spawning `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegOpener {
    /// Use explicit binary locations.
    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Query stream size, rate, and frame count with `ffprobe`.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] if `ffprobe` cannot run or finds no video
    /// stream.
    pub fn probe(&self, path: &Path) -> Result<SourceInfo> {
        if !path.is_file() {
            return Err(Error::source_unavailable(path, "no such file"));
        }
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,nb_frames",
                "-of",
                "default=noprint_wrappers=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::source_unavailable(path, format!("running {}: {e}", self.ffprobe.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::source_unavailable(path, stderr.trim()));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let info = parse_probe_output(&text).ok_or_else(|| Error::source_unavailable(path, "no video stream"))?;
        log::info!(
            "probe {}: {}x{} fps={:?} frames={:?}",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.frame_count
        );
        Ok(info)
    }
}

impl SourceOpener for FfmpegOpener {
    type Source = FfmpegSource;

    fn open(&self, path: &Path) -> Result<FfmpegSource> {
        let info = self.probe(path)?;
        let mut child = Command::new(&self.ffmpeg)
            .args(decode_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::source_unavailable(path, format!("running {}: {e}", self.ffmpeg.display())))?;

        let stderr = StderrTail::collect(&mut child);
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::source_unavailable(path, "ffmpeg stdout not captured"));
        };
        log::debug!("ffmpeg decoder started for {}", path.display());

        Ok(FfmpegSource {
            path: path.to_path_buf(),
            child,
            stdout,
            stderr,
            info,
            frame_bytes: info.width as usize * info.height as usize * 3,
            frames_read: 0,
        })
    }
}

/// Decoder command line. Rotation metadata is ignored so frames keep the
/// coded size `ffprobe` reports.
fn decode_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-nostdin", "-hide_banner", "-loglevel", "error", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_os_string());
    args.extend(
        ["-map", "0:v:0", "-fps_mode", "passthrough", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]
            .into_iter()
            .map(OsString::from),
    );
    args
}

/// Bytes of child stderr kept for error messages.
const STDERR_TAIL_BYTES: usize = 4096;

/// Drains a child's stderr on its own thread so a chatty child never blocks
/// on a full pipe. Keeps only the last [`STDERR_TAIL_BYTES`].
struct StderrTail {
    handle: Option<JoinHandle<String>>,
}

impl StderrTail {
    fn collect(child: &mut Child) -> Self {
        let handle = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut kept: Vec<u8> = Vec::new();
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => {
                            kept.extend_from_slice(&chunk[..n]);
                            if kept.len() > STDERR_TAIL_BYTES {
                                kept.drain(..kept.len() - STDERR_TAIL_BYTES);
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(_) => break,
                    }
                }
                String::from_utf8_lossy(&kept).trim().to_string()
            })
        });
        Self { handle }
    }

    /// Wait for the pipe to close and return the kept text. Call after the
    /// child has exited.
    fn finish(&mut self) -> String {
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

/// Running `ffmpeg` decoder. Killed and reaped on drop.
pub struct FfmpegSource {
    path: PathBuf,
    child: Child,
    stdout: ChildStdout,
    stderr: StderrTail,
    info: SourceInfo,
    frame_bytes: usize,
    frames_read: u64,
}

/// Fill `buf` from `reader`. `Ok(false)` if the stream ends before the first
/// byte; a stream ending partway through `buf` is `UnexpectedEof`.
pub fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut total = 0usize;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) if total == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended {total} bytes into a {}-byte frame", buf.len()),
                ))
            }
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

impl FfmpegSource {
    /// Reap the decoder after its stdout closed. Any non-zero exit is an
    /// error, however many frames came before it.
    fn finish_stream(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| Error::source_unavailable(&self.path, e))?;
        let stderr = self.stderr.finish();
        if status.success() {
            log::debug!("{}: decoder finished after {} frames", self.path.display(), self.frames_read);
            return Ok(());
        }
        Err(Error::source_unavailable(
            &self.path,
            format!("ffmpeg exited with {status} after {} frames: {stderr}", self.frames_read),
        ))
    }

    fn read_failed(&mut self, e: io::Error) -> Error {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let stderr = self.stderr.finish();
        Error::source_unavailable(&self.path, format!("{e} after {} frames: {stderr}", self.frames_read))
    }
}

impl VideoSource for FfmpegSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut buf = vec![0u8; self.frame_bytes];
        match read_exact_or_eof(&mut self.stdout, &mut buf) {
            Ok(true) => {}
            Ok(false) => {
                self.finish_stream()?;
                return Ok(None);
            }
            Err(e) => return Err(self.read_failed(e)),
        }
        self.frames_read += 1;
        let frame = RgbImage::from_raw(self.info.width, self.info.height, buf)
            .ok_or_else(|| Error::source_unavailable(&self.path, "short frame buffer"))?;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.stderr.finish();
    }
}

/// Writes an ordered run of equally sized frames as a video file.
pub trait VideoAssembler {
    /// # Errors
    ///
    /// [`Error::EmptyInput`] for no frames, [`Error::InvalidDimensions`] for a
    /// frame whose size differs from the first, [`Error::InvalidParameter`]
    /// for a non-positive rate, [`Error::EncodeWrite`] if writing fails.
    fn assemble(&self, frames: &[RgbImage], fps: f64, output: &Path) -> Result<()>;
}

/// Check the assembler contract: non-empty, uniform size, positive rate.
/// Returns the shared frame size.
///
/// # Errors
///
/// See [`VideoAssembler::assemble`].
pub fn check_frames(frames: &[RgbImage], fps: f64) -> Result<(u32, u32)> {
    let first = frames.first().ok_or(Error::EmptyInput("frame sequence"))?;
    let dims = first.dimensions();
    if let Some(bad) = frames.iter().find(|f| f.dimensions() != dims) {
        let (width, height) = bad.dimensions();
        return Err(Error::InvalidDimensions { width, height });
    }
    if !fps.is_finite() || fps <= 0.0 {
        return Err(Error::parameter("fps", format!("must be > 0, got {fps}")));
    }
    Ok(dims)
}

/// Removes a file on drop unless committed.
struct PartialOutput {
    path: PathBuf,
    committed: bool,
}

impl PartialOutput {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit_to(mut self, target: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Encodes frames to H.264 MP4 with an `ffmpeg` subprocess.
///
/// Frames go to a hidden sibling file that is renamed over `output` only once
/// `ffmpeg` succeeds, so a failed run leaves nothing that looks complete.
#[derive(Debug, Clone)]
pub struct FfmpegAssembler {
    ffmpeg: PathBuf,
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegAssembler {
    pub fn with_binary(ffmpeg: impl Into<PathBuf>) -> Self {
        Self { ffmpeg: ffmpeg.into() }
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.partial"))
}

impl VideoAssembler for FfmpegAssembler {
    fn assemble(&self, frames: &[RgbImage], fps: f64, output: &Path) -> Result<()> {
        let (width, height) = check_frames(frames, fps)?;
        let partial = PartialOutput::new(partial_path(output));
        log::info!(
            "encoding {} frames of {width}x{height} at {fps} fps to {}",
            frames.len(),
            output.display()
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", format!("{width}x{height}").as_str(), "-r", fps.to_string().as_str(), "-i", "-"])
            // yuv420p needs even sides
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-f", "mp4"])
            .arg(&partial.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::encode_write(output, format!("running {}: {e}", self.ffmpeg.display())))?;

        let mut stderr = StderrTail::collect(&mut child);
        let mut write_error = None;
        if let Some(mut stdin) = child.stdin.take() {
            for frame in frames {
                if let Err(e) = stdin.write_all(frame.as_raw()) {
                    write_error = Some(e);
                    break;
                }
            }
        }

        let status = child.wait().map_err(|e| Error::encode_write(output, e))?;
        let stderr = stderr.finish();
        if !status.success() {
            return Err(Error::encode_write(output, format!("ffmpeg exited with {status}: {stderr}")));
        }
        if let Some(e) = write_error {
            return Err(Error::encode_write(output, e));
        }

        partial
            .commit_to(output)
            .map_err(|e| Error::encode_write(output, e))?;
        log::info!("wrote {}", output.display());
        Ok(())
    }
}
