#![forbid(unsafe_code)]

pub mod assets;
pub mod color;
pub mod config;
pub mod effect;
pub mod encode_ffmpeg;
pub mod flow;
pub mod foundation;
pub mod frame;
pub mod schedule;
pub mod sink;
pub mod source;
pub mod warp;

pub use assets::{
    decode::{decode_still_image, load_still_image, random_still_image},
    media::{Delivery, FfmpegFrameSource, FfmpegInput, VideoSourceInfo, probe_video},
};
pub use config::EffectConfig;
pub use effect::{Effect, EffectHandle, EffectState, Readiness, RunSummary, StopReason};
pub use encode_ffmpeg::{EncodeConfig, FfmpegEncoder, default_mp4_config, is_ffmpeg_on_path};
pub use flow::{FlowParams, MotionEstimator, PyramidLucasKanade, ZeroMotion};
pub use foundation::{
    core::{Fps, FrameSize},
    error::{FlowError, FlowResult},
};
pub use frame::{Displacement, GrayFrame, MotionField, PixelBuffer};
pub use schedule::{FixedTicks, FrameClock, StopSignal, Tick, Ticker, Unpaced};
pub use sink::{DisplaySink, LatestFrameSink, PngSequenceSink, PreviewFileSink, Tee, save_png};
pub use source::{FrameSource, FrameSequence};
pub use warp::{BoundsPolicy, forward_warp};
