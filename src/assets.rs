//! Inputs around the core: the still image and ffmpeg-backed video frames.

pub mod decode;
pub mod media;
