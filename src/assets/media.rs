use std::{
    io::{BufReader, Read},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, sync_channel},
    time::Duration,
};

use tracing::{debug, warn};

use crate::{
    foundation::{
        core::{Fps, FrameSize},
        error::{FlowError, FlowResult},
    },
    frame::GrayFrame,
    source::FrameSource,
};

#[derive(Clone, Debug)]
pub struct VideoSourceInfo {
    pub source_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub frame_count: Option<u64>,
}

impl VideoSourceInfo {
    pub fn fps(&self) -> Option<Fps> {
        Fps::new(self.fps_num, self.fps_den).ok()
    }
}

pub fn is_ffprobe_on_path() -> bool {
    Command::new("ffprobe")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn probe_video(source_path: &Path) -> FlowResult<VideoSourceInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        nb_frames: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
    }

    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(source_path)
        .output()
        .map_err(|e| FlowError::source_unavailable(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(FlowError::source_unavailable(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| FlowError::source_unavailable(format!("ffprobe json parse failed: {e}")))?;
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| FlowError::source_unavailable("no video stream found"))?;
    let width = video_stream
        .width
        .ok_or_else(|| FlowError::source_unavailable("missing video width from ffprobe"))?;
    let height = video_stream
        .height
        .ok_or_else(|| FlowError::source_unavailable("missing video height from ffprobe"))?;
    let (fps_num, fps_den) =
        parse_ff_ratio(video_stream.r_frame_rate.as_deref().unwrap_or("0/1"))
            .ok_or_else(|| FlowError::source_unavailable("invalid video r_frame_rate"))?;
    let frame_count = video_stream
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok());

    Ok(VideoSourceInfo {
        source_path: source_path.to_path_buf(),
        width,
        height,
        fps_num,
        fps_den,
        frame_count,
    })
}

fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.parse::<u32>().ok()?;
    let b = parts.next()?.parse::<u32>().ok()?;
    if b == 0 {
        return None;
    }
    Some((a, b))
}

/// What ffmpeg should read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FfmpegInput {
    /// A file path or URL. `looping` replays it forever.
    File { location: String, looping: bool },
    /// A capture device, e.g. `v4l2` + `/dev/video0` or `avfoundation` + `0`.
    Device { format: String, name: String },
}

/// How captured frames are handed to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Every decoded frame, in order.
    Sequential,
    /// Only the newest frame; stale ones are skipped.
    Latest,
}

/// Grayscale frames decoded by a child `ffmpeg`, cover-cropped and scaled to the working size.
///
/// A reader thread pulls fixed-size frames off ffmpeg's stdout and hands them over a bounded
/// channel, so [`FrameSource::poll_ready`] never blocks.
pub struct FfmpegFrameSource {
    size: FrameSize,
    delivery: Delivery,
    stall_timeout: Duration,
    child: Child,
    frames: Receiver<GrayFrame>,
    pending: Option<GrayFrame>,
}

impl FfmpegFrameSource {
    pub fn spawn(
        input: &FfmpegInput,
        size: FrameSize,
        delivery: Delivery,
        stall_timeout: Duration,
    ) -> FlowResult<Self> {
        size.validate()?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .args(["-v", "error", "-nostdin"]);
        match input {
            FfmpegInput::File { location, looping } => {
                if *looping {
                    cmd.args(["-stream_loop", "-1"]);
                }
                cmd.arg("-i").arg(location);
            }
            FfmpegInput::Device { format, name } => {
                cmd.args(["-f", format.as_str(), "-i", name.as_str()]);
            }
        }
        cmd.args([
            "-an",
            "-vf",
            &scale_filter(size),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "gray",
            "pipe:1",
        ]);

        let mut child = cmd.spawn().map_err(|e| {
            FlowError::source_unavailable(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FlowError::source_unavailable("failed to open ffmpeg stdout"))?;

        let (tx, rx) = sync_channel::<GrayFrame>(4);
        std::thread::spawn(move || {
            let mut r = BufReader::new(stdout);
            let mut buf = vec![0u8; size.pixel_count()];
            let mut n = 0u64;
            loop {
                if let Err(e) = r.read_exact(&mut buf) {
                    debug!(frames = n, "ffmpeg stream closed: {e}");
                    break;
                }
                let Ok(frame) = GrayFrame::new(size, buf.clone()) else {
                    break;
                };
                if tx.send(frame).is_err() {
                    break;
                }
                n += 1;
            }
        });

        Ok(Self {
            size,
            delivery,
            stall_timeout,
            child,
            frames: rx,
            pending: None,
        })
    }

    fn take_newest(&mut self) -> Option<GrayFrame> {
        let mut newest = self.pending.take();
        while let Ok(f) = self.frames.try_recv() {
            newest = Some(f);
        }
        newest
    }
}

fn scale_filter(size: FrameSize) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
        w = size.width,
        h = size.height
    )
}

impl FrameSource for FfmpegFrameSource {
    fn size(&self) -> FrameSize {
        self.size
    }

    fn poll_ready(&mut self) -> FlowResult<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        match self.frames.try_recv() {
            Ok(f) => {
                self.pending = Some(f);
                Ok(true)
            }
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => Err(FlowError::source_unavailable(
                "ffmpeg exited before producing a frame",
            )),
        }
    }

    fn capture(&mut self) -> FlowResult<GrayFrame> {
        let ready = match self.delivery {
            Delivery::Sequential => self.pending.take(),
            Delivery::Latest => self.take_newest(),
        };
        if let Some(f) = ready {
            return Ok(f);
        }
        match self.frames.recv_timeout(self.stall_timeout) {
            Ok(f) => Ok(f),
            Err(RecvTimeoutError::Timeout) => Err(FlowError::source_unavailable(format!(
                "no frame from ffmpeg within {:?}",
                self.stall_timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(FlowError::source_unavailable("end of video stream"))
            }
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!("ffmpeg already gone: {e}");
        }
        if let Err(e) = self.child.wait() {
            warn!("failed to reap ffmpeg: {e}");
        }
        // The reader thread exits on its own once stdout closes or the receiver is dropped.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_parsing() {
        assert_eq!(parse_ff_ratio("30000/1001"), Some((30000, 1001)));
        assert_eq!(parse_ff_ratio("25/0"), None);
        assert_eq!(parse_ff_ratio("abc"), None);
    }

    #[test]
    fn scale_filter_covers_then_crops() {
        assert_eq!(
            scale_filter(FrameSize::new(256, 128)),
            "scale=256:128:force_original_aspect_ratio=increase,crop=256:128"
        );
    }

    #[test]
    fn probe_info_fps() {
        let info = VideoSourceInfo {
            source_path: PathBuf::from("a.mp4"),
            width: 64,
            height: 64,
            fps_num: 0,
            fps_den: 1,
            frame_count: None,
        };
        assert!(info.fps().is_none());
    }
}
