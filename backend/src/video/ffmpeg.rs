use image::RgbImage;
use log::{debug, warn};
use serde::Deserialize;
use std::ffi::OsString;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use super::{VideoDecoder, VideoError, VideoSource};

const STDERR_LIMIT: u64 = 4096;

/// Decodes video through the `ffprobe` / `ffmpeg` command line tools.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: String,
    ffprobe: String,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct StreamInfo {
    width: u32,
    height: u32,
    frame_rate: Option<f64>,
    frame_count: Option<u64>,
}

impl FfmpegDecoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn probe(&self, path: &Path) -> Result<StreamInfo, VideoError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error"])
            .args(["-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames"])
            .args(["-of", "json"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| VideoError::Probe(format!("{} not available: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Open(stderr.trim().to_string()));
        }

        parse_probe(&output.stdout)
    }
}

fn parse_probe(stdout: &[u8]) -> Result<StreamInfo, VideoError> {
    let probe: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| VideoError::Probe(e.to_string()))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| VideoError::Open("No video stream found".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(VideoError::Open("Video stream has no frame size".to_string())),
    };

    Ok(StreamInfo {
        width,
        height,
        frame_rate: stream
            .r_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_rate)),
        frame_count: stream.nb_frames.as_deref().and_then(|n| n.parse().ok()),
    })
}

/// Parses ffprobe's rational rates such as `30000/1001`.
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Arguments for streaming `path` as rgb24 at exactly the probed size.
/// Autorotation is off so a display-matrix tag cannot transpose the frames.
fn decode_args(path: &Path, info: &StreamInfo) -> Vec<OsString> {
    let size = format!("{}x{}", info.width, info.height);
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.extend(
        ["-an", "-sn", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s", size.as_str(), "pipe:1"]
            .into_iter()
            .map(OsString::from),
    );
    args
}

impl FfmpegDecoder {
    fn spawn(&self, path: &Path) -> Result<FfmpegSource, VideoError> {
        if !path.is_file() {
            return Err(VideoError::Open(format!("{} is not a file", path.display())));
        }

        let info = self.probe(path)?;
        debug!(
            "Opened {}: {}x{} at {:?} fps, {:?} frames",
            path.display(),
            info.width,
            info.height,
            info.frame_rate,
            info.frame_count
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(decode_args(path, &info))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(VideoError::Open("ffmpeg produced no output pipe".to_string()));
        };

        Ok(FfmpegSource {
            child,
            stdout: BufReader::new(stdout),
            stderr: Some(collect_stderr(stderr)),
            info,
            finished: false,
        })
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>, VideoError> {
        Ok(Box::new(self.spawn(path)?))
    }
}

/// Keeps the first `STDERR_LIMIT` bytes of ffmpeg's diagnostics and drains
/// the rest so the child never blocks on a full pipe.
fn collect_stderr(mut stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut head = Vec::new();
        let _ = Read::by_ref(&mut stderr).take(STDERR_LIMIT).read_to_end(&mut head);
        let _ = std::io::copy(&mut stderr, &mut std::io::sink());
        String::from_utf8_lossy(&head).trim().to_string()
    })
}

/// A running `ffmpeg` child streaming rgb24 frames. The stream only ends
/// cleanly when ffmpeg exits successfully on a frame boundary. The child is
/// killed and reaped on drop.
struct FfmpegSource {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    info: StreamInfo,
    finished: bool,
}

impl FfmpegSource {
    fn diagnostics(&mut self) -> String {
        let text = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if text.is_empty() {
            "no diagnostics".to_string()
        } else {
            text
        }
    }
}

impl VideoSource for FfmpegSource {
    fn frame_rate(&self) -> Option<f64> {
        self.info.frame_rate
    }

    fn frame_count(&self) -> Option<u64> {
        self.info.frame_count
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        if self.finished {
            return Ok(None);
        }

        let frame_len = self.info.width as usize * self.info.height as usize * 3;
        let mut buf = vec![0u8; frame_len];

        let filled = read_full(&mut self.stdout, &mut buf)?;
        if filled == frame_len {
            return RgbImage::from_raw(self.info.width, self.info.height, buf)
                .map(Some)
                .ok_or_else(|| VideoError::Decode("frame buffer does not match stream size".to_string()));
        }

        self.finished = true;
        let status = self.child.wait()?;
        if !status.success() {
            let reason = self.diagnostics();
            warn!("ffmpeg failed mid-stream ({}): {}", status, reason);
            return Err(VideoError::Decode(format!("ffmpeg {}: {}", status, reason)));
        }
        if filled > 0 {
            return Err(VideoError::Decode(format!(
                "truncated final frame ({} of {} bytes)",
                filled, frame_len
            )));
        }
        Ok(None)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Fills `buf` unless EOF comes first; returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, VideoError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_rational_frame_rates() {
        assert_eq!(parse_rate("10/1"), Some(10.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("garbage"), None);
    }

    #[test]
    fn parses_probe_json() {
        let json = br#"{"streams":[{"width":64,"height":48,"r_frame_rate":"10/1","avg_frame_rate":"10/1","nb_frames":"100"}]}"#;
        let info = parse_probe(json).unwrap();

        assert_eq!(info.width, 64);
        assert_eq!(info.height, 48);
        assert_eq!(info.frame_rate, Some(10.0));
        assert_eq!(info.frame_count, Some(100));
    }

    #[test]
    fn falls_back_to_average_rate() {
        let json = br#"{"streams":[{"width":8,"height":8,"r_frame_rate":"0/0","avg_frame_rate":"24/1"}]}"#;
        let info = parse_probe(json).unwrap();

        assert_eq!(info.frame_rate, Some(24.0));
        assert_eq!(info.frame_count, None);
    }

    #[test]
    fn probe_without_video_stream_cannot_open() {
        assert!(matches!(parse_probe(br#"{"streams":[]}"#), Err(VideoError::Open(_))));
        assert!(matches!(parse_probe(br#"{}"#), Err(VideoError::Open(_))));
    }

    #[test]
    fn missing_file_is_rejected_before_spawning() {
        let decoder = FfmpegDecoder::new("ffmpeg", "ffprobe");
        let result = decoder.open(Path::new("/definitely/not/here.mp4"));

        assert!(matches!(result, Err(VideoError::Open(_))));
    }

    #[test]
    fn rotated_stream_keeps_coded_size_and_pins_output_geometry() {
        let json = br#"{"streams":[{"width":1920,"height":1080,"r_frame_rate":"30/1",
            "tags":{"rotate":"90"},"side_data_list":[{"side_data_type":"Display Matrix","rotation":-90}]}]}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));

        let args: Vec<String> = decode_args(Path::new("clip.mp4"), &info)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let input_at = args.iter().position(|a| a == "-i").unwrap();
        let noautorotate_at = args.iter().position(|a| a == "-noautorotate").unwrap();
        assert!(noautorotate_at < input_at);
        let size_at = args.iter().position(|a| a == "-s").unwrap();
        assert_eq!(args[size_at + 1], "1920x1080");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn read_full_reports_short_reads() {
        let mut reader = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 5];

        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 3);
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }

    #[cfg(unix)]
    mod with_fake_tools {
        use super::*;
        use crate::detection::heuristics::VarianceHeuristic;
        use crate::detection::sampler::{sample_frames, SamplingPolicy};
        use crate::detection::error::DetectionError;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;
        use std::sync::{Mutex, MutexGuard, PoisonError};
        use std::time::{Duration, Instant};

        // Writing an executable while another test forks can fail with ETXTBSY.
        static SPAWN_LOCK: Mutex<()> = Mutex::new(());

        // One 2x2 rgb24 frame of [1, 2, 3] pixels.
        const FRAME: &str = r"printf '\001\002\003\001\002\003\001\002\003\001\002\003'";

        /// Throwaway `ffprobe` reporting a 2x2 stream at 2 fps, and an `ffmpeg`
        /// running `body`.
        struct FakeTools {
            dir: PathBuf,
            _guard: MutexGuard<'static, ()>,
        }

        impl FakeTools {
            fn new(body: &str) -> Self {
                let guard = SPAWN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
                let dir = std::env::temp_dir().join(format!("fake-ffmpeg-{}", uuid::Uuid::new_v4()));
                std::fs::create_dir_all(&dir).unwrap();
                write_script(
                    &dir.join("ffprobe"),
                    r#"printf '%s' '{"streams":[{"width":2,"height":2,"r_frame_rate":"2/1","nb_frames":"4"}]}'"#,
                );
                write_script(&dir.join("ffmpeg"), body);
                std::fs::write(dir.join("clip.mp4"), b"not decoded by the fake").unwrap();
                Self { dir, _guard: guard }
            }

            fn decoder(&self) -> FfmpegDecoder {
                FfmpegDecoder::new(
                    self.dir.join("ffmpeg").to_string_lossy().into_owned(),
                    self.dir.join("ffprobe").to_string_lossy().into_owned(),
                )
            }

            fn clip(&self) -> PathBuf {
                self.dir.join("clip.mp4")
            }
        }

        impl Drop for FakeTools {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.dir);
            }
        }

        fn write_script(path: &Path, body: &str) {
            std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        #[test]
        fn decodes_frames_until_clean_exit() {
            let tools = FakeTools::new(&format!("for i in 1 2 3; do {}; done\nexit 0", FRAME));
            let mut source = tools.decoder().spawn(&tools.clip()).unwrap();

            assert_eq!(source.frame_rate(), Some(2.0));
            assert_eq!(source.frame_count(), Some(4));
            for _ in 0..3 {
                let frame = source.next_frame().unwrap().unwrap();
                assert_eq!(frame.dimensions(), (2, 2));
                assert_eq!(frame.get_pixel(1, 1).0, [1, 2, 3]);
            }
            assert!(source.next_frame().unwrap().is_none());
            assert!(source.next_frame().unwrap().is_none());
        }

        #[test]
        fn failing_exit_after_partial_output_is_an_error() {
            let tools = FakeTools::new(&format!(
                "for i in 1 2 3; do {}; done\necho 'Invalid data found when processing input' >&2\nexit 1",
                FRAME
            ));
            let mut source = tools.decoder().spawn(&tools.clip()).unwrap();

            for _ in 0..3 {
                assert!(source.next_frame().unwrap().is_some());
            }
            match source.next_frame() {
                Err(VideoError::Decode(message)) => assert!(message.contains("Invalid data found")),
                other => panic!("expected decode error, got {:?}", other.map(|f| f.is_some())),
            }
        }

        #[test]
        fn sampling_a_failing_stream_yields_no_partial_result() {
            let tools = FakeTools::new(&format!("for i in 1 2 3; do {}; done\nexit 1", FRAME));
            let mut source = tools.decoder().open(&tools.clip()).unwrap();
            let scorer = VarianceHeuristic::new("Fallback Analysis");

            let result = sample_frames(source.as_mut(), &scorer, &SamplingPolicy::default());
            assert!(matches!(result, Err(DetectionError::Decode(_))));
        }

        #[test]
        fn truncated_final_frame_is_an_error() {
            let tools = FakeTools::new(&format!("{}\nprintf 'abcde'\nexit 0", FRAME));
            let mut source = tools.decoder().spawn(&tools.clip()).unwrap();

            assert!(source.next_frame().unwrap().is_some());
            match source.next_frame() {
                Err(VideoError::Decode(message)) => assert!(message.contains("truncated")),
                other => panic!("expected decode error, got {:?}", other.map(|f| f.is_some())),
            }
        }

        #[cfg(target_os = "linux")]
        #[test]
        fn dropping_mid_stream_kills_and_reaps_ffmpeg() {
            let tools = FakeTools::new(&format!("{}\nexec sleep 30", FRAME));
            let mut source = tools.decoder().spawn(&tools.clip()).unwrap();
            assert!(source.next_frame().unwrap().is_some());

            let pid = source.child.id();
            let started = Instant::now();
            drop(source);

            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(!Path::new(&format!("/proc/{}", pid)).exists());
        }
    }
}
