use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::debug;

use crate::{foundation::error::FlowResult, frame::PixelBuffer};

/// Where finished buffers go: a preview, an image sequence, an encoder.
pub trait DisplaySink {
    fn publish(&mut self, buffer: &PixelBuffer) -> FlowResult<()>;

    /// The last published buffer, if any. Read-only; used by save actions.
    fn snapshot(&self) -> Option<PixelBuffer>;
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn publish(&mut self, buffer: &PixelBuffer) -> FlowResult<()> {
        (**self).publish(buffer)
    }

    fn snapshot(&self) -> Option<PixelBuffer> {
        (**self).snapshot()
    }
}

/// `None` discards everything.
impl<T: DisplaySink> DisplaySink for Option<T> {
    fn publish(&mut self, buffer: &PixelBuffer) -> FlowResult<()> {
        match self {
            Some(sink) => sink.publish(buffer),
            None => Ok(()),
        }
    }

    fn snapshot(&self) -> Option<PixelBuffer> {
        self.as_ref().and_then(|sink| sink.snapshot())
    }
}

/// Keeps only the most recent buffer.
#[derive(Clone, Debug, Default)]
pub struct LatestFrameSink {
    latest: Option<PixelBuffer>,
    published: u64,
}

impl LatestFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

impl DisplaySink for LatestFrameSink {
    fn publish(&mut self, buffer: &PixelBuffer) -> FlowResult<()> {
        self.latest = Some(buffer.clone());
        self.published += 1;
        Ok(())
    }

    fn snapshot(&self) -> Option<PixelBuffer> {
        self.latest.clone()
    }
}

pub fn ensure_parent_dir(path: &Path) -> FlowResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

pub fn save_png(path: &Path, buffer: &PixelBuffer) -> FlowResult<()> {
    ensure_parent_dir(path)?;
    let size = buffer.size();
    image::save_buffer_with_format(
        path,
        buffer.as_raw(),
        size.width,
        size.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}

/// Writes every published buffer as `NNNNNN.png` into a folder.
#[derive(Debug)]
pub struct PngSequenceSink {
    dir: PathBuf,
    next_index: u64,
    latest: Option<PixelBuffer>,
}

impl PngSequenceSink {
    /// Creates `dir` if needed and removes numbered frames left by an earlier run, so the folder
    /// only ever holds one sequence. Other files are left alone. Numbering starts at `first_index`.
    pub fn create(dir: impl Into<PathBuf>, first_index: u64) -> FlowResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create frame folder '{}'", dir.display()))?;
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("list frame folder '{}'", dir.display()))?;
        let mut removed = 0usize;
        for entry in entries {
            let path = entry
                .with_context(|| format!("list frame folder '{}'", dir.display()))?
                .path();
            if path.is_file() && is_frame_name(&path) {
                std::fs::remove_file(&path)
                    .with_context(|| format!("remove stale frame '{}'", path.display()))?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(dir = %dir.display(), removed, "cleared stale frames");
        }
        Ok(Self {
            dir,
            next_index: first_index,
            latest: None,
        })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{index:06}.png"))
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }
}

impl DisplaySink for PngSequenceSink {
    fn publish(&mut self, buffer: &PixelBuffer) -> FlowResult<()> {
        let path = self.frame_path(self.next_index);
        save_png(&path, buffer)?;
        debug!(path = %path.display(), "wrote frame");
        self.next_index += 1;
        self.latest = Some(buffer.clone());
        Ok(())
    }

    fn snapshot(&self) -> Option<PixelBuffer> {
        self.latest.clone()
    }
}

fn is_frame_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.strip_suffix(".png")
        .is_some_and(|stem| stem.len() >= 6 && stem.bytes().all(|b| b.is_ascii_digit()))
}

/// Fans one buffer out to several sinks, in order. Snapshot comes from the first.
pub struct Tee<A, B> {
    pub first: A,
    pub second: B,
}

impl<A: DisplaySink, B: DisplaySink> DisplaySink for Tee<A, B> {
    fn publish(&mut self, buffer: &PixelBuffer) -> FlowResult<()> {
        self.first.publish(buffer)?;
        self.second.publish(buffer)
    }

    fn snapshot(&self) -> Option<PixelBuffer> {
        self.first.snapshot().or_else(|| self.second.snapshot())
    }
}

/// Overwrites a single preview file on every publish.
#[derive(Debug)]
pub struct PreviewFileSink {
    path: PathBuf,
    latest: Option<PixelBuffer>,
}

impl PreviewFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            latest: None,
        }
    }
}

impl DisplaySink for PreviewFileSink {
    fn publish(&mut self, buffer: &PixelBuffer) -> FlowResult<()> {
        // write-then-rename so viewers never pick up a half-written file
        let tmp = self.path.with_extension("tmp.png");
        save_png(&tmp, buffer)?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace preview '{}'", self.path.display()))?;
        self.latest = Some(buffer.clone());
        Ok(())
    }

    fn snapshot(&self) -> Option<PixelBuffer> {
        self.latest.clone()
    }
}
