use asciivid::{
    AsciiVideoConverter, Error, FfmpegAssembler, FfmpegOpener, OutputFps, Progress, ProgressPhase, RenderConfig, Result,
    SourceInfo, SourceOpener, VideoAssembler, VideoSource,
};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct ClipSource {
    frames: std::vec::IntoIter<RgbImage>,
    info: SourceInfo,
    live: Arc<AtomicUsize>,
}

impl VideoSource for ClipSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.next())
    }
}

impl Drop for ClipSource {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct ClipOpener {
    frames: Vec<RgbImage>,
    fps: Option<f64>,
    live: Arc<AtomicUsize>,
}

impl ClipOpener {
    fn new(frames: Vec<RgbImage>, fps: Option<f64>) -> Self {
        Self {
            frames,
            fps,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl SourceOpener for ClipOpener {
    type Source = ClipSource;

    fn open(&self, path: &Path) -> Result<ClipSource> {
        if path.to_string_lossy().contains("missing") {
            return Err(Error::SourceUnavailable {
                path: path.to_path_buf(),
                reason: "no such file".into(),
            });
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        let (width, height) = self.frames.first().map_or((0, 0), |f| f.dimensions());
        Ok(ClipSource {
            frames: self.frames.clone().into_iter(),
            info: SourceInfo {
                width,
                height,
                fps: self.fps,
                frame_count: Some(self.frames.len() as u64),
            },
            live: Arc::clone(&self.live),
        })
    }
}

#[derive(Default)]
struct RecordingAssembler {
    calls: Mutex<Vec<(Vec<RgbImage>, f64, PathBuf)>>,
}

impl VideoAssembler for RecordingAssembler {
    fn assemble(&self, frames: &[RgbImage], fps: f64, output: &Path) -> Result<()> {
        asciivid::video::check_frames(frames, fps)?;
        self.calls
            .lock()
            .unwrap()
            .push((frames.to_vec(), fps, output.to_path_buf()));
        Ok(())
    }
}

fn checkerboard(n: usize) -> Vec<RgbImage> {
    (0..n)
        .map(|i| {
            RgbImage::from_fn(2, 2, |x, y| {
                if (x + y + i as u32) % 2 == 0 {
                    Rgb([255, 255, 255])
                } else {
                    Rgb([0, 0, 0])
                }
            })
        })
        .collect()
}

#[test]
fn two_frame_clip_becomes_two_equal_frames() {
    let opener = ClipOpener::new(checkerboard(2), Some(30.0));
    let converter = AsciiVideoConverter::with_backends(opener.clone(), RecordingAssembler::default());
    let config = RenderConfig::default()
        .with_width(2)
        .with_palette(" #")
        .with_fps(OutputFps::Fixed(1.0));

    let written = converter
        .convert_video_with_progress(Path::new("clip.mp4"), Path::new("out.mp4"), &config, |_| {})
        .unwrap();
    assert_eq!(written, 2);

    let calls = converter.assembler().calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (frames, fps, output) = &calls[0];
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].dimensions(), frames[1].dimensions());
    assert_eq!(*fps, 1.0);
    assert_eq!(output, Path::new("out.mp4"));
    assert_eq!(opener.live.load(Ordering::SeqCst), 0);
}

#[test]
fn phases_arrive_in_order() {
    let converter = AsciiVideoConverter::with_backends(ClipOpener::new(checkerboard(4), None), RecordingAssembler::default());
    let config = RenderConfig::default().with_width(2).with_frame_skip(2);
    let seen: Mutex<Vec<Progress>> = Mutex::new(Vec::new());

    converter
        .convert_video_with_progress(Path::new("clip.mp4"), Path::new("out.mp4"), &config, |p| {
            seen.lock().unwrap().push(p)
        })
        .unwrap();

    let seen = seen.into_inner().unwrap();
    let phases: Vec<ProgressPhase> = seen.iter().map(|p| p.phase.clone()).collect();
    assert_eq!(
        phases,
        vec![
            ProgressPhase::ProcessingFrames,
            ProgressPhase::ProcessingFrames,
            ProgressPhase::Encoding,
            ProgressPhase::Complete,
        ]
    );
    assert_eq!(seen[0].message, "Processing frame 0/4");
    assert_eq!(seen[1].message, "Processing frame 2/4");
    assert_eq!(seen[3].message, "Done! Video saved as: out.mp4");
}

#[test]
fn match_source_uses_reported_rate() {
    let converter = AsciiVideoConverter::with_backends(ClipOpener::new(checkerboard(3), Some(24.0)), RecordingAssembler::default());
    let config = RenderConfig::default().with_width(2).with_fps(OutputFps::MatchSource);
    converter
        .convert_video_with_progress(Path::new("clip.mp4"), Path::new("out.mp4"), &config, |_| {})
        .unwrap();
    assert_eq!(converter.assembler().calls.lock().unwrap()[0].1, 24.0);
}

#[test]
fn match_source_falls_back_without_rate() {
    let converter = AsciiVideoConverter::with_backends(ClipOpener::new(checkerboard(1), None), RecordingAssembler::default());
    let config = RenderConfig::default().with_width(2).with_fps(OutputFps::MatchSource);
    converter
        .convert_video_with_progress(Path::new("clip.mp4"), Path::new("out.mp4"), &config, |_| {})
        .unwrap();
    assert_eq!(converter.assembler().calls.lock().unwrap()[0].1, asciivid::DEFAULT_FPS);
}

#[test]
fn default_output_sits_beside_source() {
    let converter = AsciiVideoConverter::with_backends(ClipOpener::new(checkerboard(1), None), RecordingAssembler::default());
    let output = converter
        .convert_video(Path::new("videos/cat.mov"), &RenderConfig::default().with_width(2))
        .unwrap();
    assert_eq!(output, PathBuf::from("videos/cat.mov_ASCII.mp4"));
    assert_eq!(converter.assembler().calls.lock().unwrap()[0].2, output);
}

#[test]
fn empty_source_is_reported() {
    let converter = AsciiVideoConverter::with_backends(ClipOpener::new(Vec::new(), None), RecordingAssembler::default());
    let err = converter
        .convert_video(Path::new("clip.mp4"), &RenderConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::EmptyInput(_)));
}

#[test]
fn missing_source_is_unavailable() {
    let converter = AsciiVideoConverter::with_backends(ClipOpener::new(checkerboard(1), None), RecordingAssembler::default());
    let err = converter
        .convert_video(Path::new("missing.mp4"), &RenderConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable { .. }));
    assert!(converter.assembler().calls.lock().unwrap().is_empty());
}

#[test]
fn bad_config_fails_before_opening() {
    let opener = ClipOpener::new(checkerboard(1), None);
    let converter = AsciiVideoConverter::with_backends(opener.clone(), RecordingAssembler::default());
    let err = converter
        .convert_video(Path::new("clip.mp4"), &RenderConfig::default().with_palette(""))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPalette));
    assert_eq!(opener.live.load(Ordering::SeqCst), 0);
}

#[test]
fn preview_renders_only_first_frame() {
    let opener = ClipOpener::new(checkerboard(3), None);
    let converter = AsciiVideoConverter::with_backends(opener.clone(), RecordingAssembler::default());
    let config = RenderConfig::default().with_width(2).with_palette(" #");
    let preview = converter.preview(Path::new("clip.mp4"), &config).unwrap();
    let first = converter
        .frames(Path::new("clip.mp4"), &config)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(preview, first);
    assert_eq!(opener.live.load(Ordering::SeqCst), 0);
}

#[test]
fn batch_size_does_not_change_output() {
    let frames = (0..5u8)
        .map(|i| RgbImage::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, i * 40])))
        .collect::<Vec<_>>();
    let opener = ClipOpener::new(frames, None);
    let config = RenderConfig::default().with_width(20);

    let serial = AsciiVideoConverter::with_backends(opener.clone(), RecordingAssembler::default()).with_batch_size(1);
    let parallel = AsciiVideoConverter::with_backends(opener, RecordingAssembler::default()).with_batch_size(4);
    let a: Vec<RgbImage> = serial.frames(Path::new("c.mp4"), &config).unwrap().collect::<Result<_>>().unwrap();
    let b: Vec<RgbImage> = parallel.frames(Path::new("c.mp4"), &config).unwrap().collect::<Result<_>>().unwrap();
    assert_eq!(a, b);
}

/// Decoded frame count and container duration of `path`.
fn frames_and_duration(path: &Path) -> (u64, f64) {
    let out = std::process::Command::new("ffprobe")
        .args(["-v", "error", "-count_frames", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=nb_read_frames:format=duration"])
        .args(["-of", "default=noprint_wrappers=1"])
        .arg(path)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = String::from_utf8(out.stdout).unwrap();
    let field = |key: &str| {
        text.lines()
            .find_map(|l| l.strip_prefix(key).and_then(|v| v.strip_prefix('=')))
            .unwrap_or_else(|| panic!("no {key} in {text}"))
            .trim()
            .to_string()
    };
    (field("nb_read_frames").parse().unwrap(), field("duration").parse().unwrap())
}

/// Full round trip through real ffmpeg, skipped when it is not installed.
#[test]
fn ffmpeg_round_trip() {
    if !asciivid::video::ffmpeg_available() {
        eprintln!("ffmpeg/ffprobe not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.mp4");
    let frames = vec![
        RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])),
        RgbImage::from_pixel(2, 2, Rgb([255, 255, 255])),
    ];
    FfmpegAssembler::default().assemble(&frames, 1.0, &source).unwrap();
    assert_eq!(frames_and_duration(&source).0, 2);

    let converter = AsciiVideoConverter::with_backends(FfmpegOpener::default(), FfmpegAssembler::default());
    let config = RenderConfig::default()
        .with_palette(" #")
        .with_width(2)
        .with_fps(OutputFps::Fixed(1.0));
    let output = converter.convert_video(&source, &config).unwrap();
    assert_eq!(output, dir.path().join("source.mp4_ASCII.mp4"));

    let (frames, duration) = frames_and_duration(&output);
    assert_eq!(frames, 2);
    assert!((duration - 2.0).abs() < 0.5, "duration {duration}");
}
