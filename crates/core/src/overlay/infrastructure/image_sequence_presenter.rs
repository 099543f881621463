use std::path::{Path, PathBuf};

use crate::overlay::domain::presenter::Presenter;
use crate::shared::frame::Frame;

use super::raster_canvas::RasterCanvas;

/// Writes every `every`-th composed frame as `frame_000123.png`.
pub struct ImageSequencePresenter {
    dir: PathBuf,
    every: u64,
    presented: u64,
    written: u64,
}

impl ImageSequencePresenter {
    /// `every` of 0 is treated as 1.
    pub fn new(dir: &Path, every: u64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            every: every.max(1),
            presented: 0,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn path_for(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }
}

impl Presenter<RasterCanvas> for ImageSequencePresenter {
    fn present(
        &mut self,
        frame: &Frame,
        canvas: &RasterCanvas,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let index = self.presented;
        self.presented += 1;
        if index % self.every != 0 {
            return Ok(());
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(index);
        canvas.composite(frame).save(&path)?;
        self.written += 1;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }
}
