//! MP4 output: published buffers are flattened to opaque RGBA and streamed to `ffmpeg`.

use std::{
    ffi::OsString,
    io::Write as _,
    path::PathBuf,
    process::{Child, ChildStdin, Command, Stdio},
};

use tracing::{debug, info};

use crate::{
    foundation::{
        core::{Fps, FrameSize},
        error::{FlowError, FlowResult, ensure_size},
    },
    frame::PixelBuffer,
    sink::{DisplaySink, ensure_parent_dir},
};

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub size: FrameSize,
    /// Passed to ffmpeg as an exact `num/den` rate.
    pub fps: Fps,
    pub out_path: PathBuf,
    /// Colour shown through transparent pixels.
    pub background: [u8; 3],
}

impl EncodeConfig {
    pub fn validate(&self) -> FlowResult<()> {
        self.size.validate()?;
        Fps::new(self.fps.num, self.fps.den)?;
        // yuv420p subsamples chroma 2x2
        if !self.size.width.is_multiple_of(2) || !self.size.height.is_multiple_of(2) {
            return Err(FlowError::validation(format!(
                "mp4 output needs even dimensions, got {}",
                self.size
            )));
        }
        Ok(())
    }

    fn ffmpeg_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push("-s".into());
        args.push(self.size.to_string().into());
        args.push("-r".into());
        args.push(format!("{}/{}", self.fps.num, self.fps.den).into());
        args.extend(
            [
                "-i", "pipe:0", "-an", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-movflags",
                "+faststart",
            ]
            .map(OsString::from),
        );
        args.push(self.out_path.clone().into_os_string());
        args
    }
}

/// H.264 in MP4 over black, which is what the transfer command writes.
pub fn default_mp4_config(out_path: impl Into<PathBuf>, size: FrameSize, fps: Fps) -> EncodeConfig {
    EncodeConfig {
        size,
        fps,
        out_path: out_path.into(),
        background: [0, 0, 0],
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// Display sink that encodes every published buffer as one video frame.
pub struct FfmpegEncoder {
    cfg: EncodeConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    opaque: Vec<u8>,
    frames: u64,
    latest: Option<PixelBuffer>,
}

impl FfmpegEncoder {
    /// Starts ffmpeg; an existing file at `out_path` is overwritten.
    pub fn new(cfg: EncodeConfig) -> FlowResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;
        if !is_ffmpeg_on_path() {
            return Err(FlowError::io("ffmpeg not found on PATH"));
        }

        let mut child = Command::new("ffmpeg")
            .args(cfg.ffmpeg_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FlowError::io(format!("spawn ffmpeg encoder: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FlowError::io("ffmpeg encoder has no stdin"))?;

        debug!(out = %cfg.out_path.display(), size = %cfg.size, fps = cfg.fps.as_f64(), "encoder started");
        Ok(Self {
            opaque: vec![0; cfg.size.pixel_count() * 4],
            cfg,
            child,
            stdin: Some(stdin),
            frames: 0,
            latest: None,
        })
    }

    pub fn encode_frame(&mut self, buffer: &PixelBuffer) -> FlowResult<()> {
        ensure_size(self.cfg.size, buffer.size())?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| FlowError::io("encoder already finished"))?;

        for (out, px) in self
            .opaque
            .chunks_exact_mut(4)
            .zip(buffer.as_raw().chunks_exact(4))
        {
            out.copy_from_slice(&over_background([px[0], px[1], px[2], px[3]], self.cfg.background));
        }
        stdin
            .write_all(&self.opaque)
            .map_err(|e| FlowError::io(format!("write frame {} to ffmpeg: {e}", self.frames)))?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Closes the pipe and waits for ffmpeg to write the container.
    pub fn finish(mut self) -> FlowResult<()> {
        self.stdin = None;
        let output = self
            .child
            .wait_with_output()
            .map_err(|e| FlowError::io(format!("wait for ffmpeg encoder: {e}")))?;
        if !output.status.success() {
            return Err(FlowError::io(format!(
                "ffmpeg encoder failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        info!(out = %self.cfg.out_path.display(), frames = self.frames, "encode finished");
        Ok(())
    }
}

impl DisplaySink for FfmpegEncoder {
    fn publish(&mut self, buffer: &PixelBuffer) -> FlowResult<()> {
        self.encode_frame(buffer)?;
        self.latest = Some(buffer.clone());
        Ok(())
    }

    fn snapshot(&self) -> Option<PixelBuffer> {
        self.latest.clone()
    }
}

/// Straight-alpha "over" onto an opaque colour, rounded to nearest.
fn over_background(px: [u8; 4], bg: [u8; 3]) -> [u8; 4] {
    let a = u32::from(px[3]);
    if a == 255 {
        return px;
    }
    let mix = |fg: u8, bg: u8| ((u32::from(fg) * a + u32::from(bg) * (255 - a) + 127) / 255) as u8;
    [mix(px[0], bg[0]), mix(px[1], bg[1]), mix(px[2], bg[2]), 255]
}
