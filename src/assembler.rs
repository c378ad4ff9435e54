//! Hands decoded images to the host's result image.
use std::collections::HashMap;

use tracing::debug;

use crate::{codec::PixelBuffer, snapshot::Resolution};

/// Name of the pass receiving the external renderer's beauty image.
pub const COMBINED_PASS: &str = "Combined";

/// Receives the image of a finished render request.
///
/// Implementations only copy; the buffer was validated against its
/// resolution when it was decoded.
pub trait FrameAssembler {
    fn assemble(&mut self, pixels: &PixelBuffer);
}

/// A rectangle of the result image, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResultRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ResultRegion {
    /// The region covering a whole image of `resolution`.
    pub fn full(resolution: Resolution) -> Self {
        Self {
            x: 0,
            y: 0,
            width: resolution.width(),
            height: resolution.height(),
        }
    }

    fn channel_count(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Region of a result being written to. Nothing is visible in the
/// `ResultImage` until it is passed to `ResultImage::end_result`.
#[derive(Debug)]
pub struct RenderResult {
    region: ResultRegion,
    passes: HashMap<String, Vec<f32>>,
}

impl RenderResult {
    pub fn region(&self) -> ResultRegion {
        self.region
    }

    /// Flat RGBA channels of `pass` inside this region.
    pub fn pass_mut(&mut self, pass: &str) -> Option<&mut [f32]> {
        self.passes.get_mut(pass).map(Vec::as_mut_slice)
    }
}

/// Host side render output made of named RGBA float passes. Rows are stored
/// bottom to top.
#[derive(Debug, Default)]
pub struct ResultImage {
    width: u32,
    height: u32,
    passes: HashMap<String, Vec<f32>>,
}

impl ResultImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start writing `region`. The returned result has a zeroed Combined pass.
    pub fn begin_result(&self, region: ResultRegion) -> RenderResult {
        let mut passes = HashMap::new();
        passes.insert(COMBINED_PASS.to_string(), vec![0.0; region.channel_count()]);

        RenderResult { region, passes }
    }

    /// Resize the image to `resolution` and drop every pass.
    pub fn reset(&mut self, resolution: Resolution) {
        debug!("resetting result image to {resolution}");
        self.width = resolution.width();
        self.height = resolution.height();
        self.passes.clear();
    }

    /// Commit `result` into the image. The image grows to cover the region
    /// if needed, which discards what it held before.
    pub fn end_result(&mut self, result: RenderResult) {
        let RenderResult { region, passes } = result;
        let width = self.width.max(region.x + region.width);
        let height = self.height.max(region.y + region.height);

        if (width, height) != (self.width, self.height) {
            debug!("resizing result image to {width}x{height}");
            self.width = width;
            self.height = height;
            self.passes.clear();
        }

        let image_row = self.width as usize * 4;
        let region_row = region.width as usize * 4;
        let image_len = image_row * self.height as usize;

        for (name, channels) in passes {
            let target = self
                .passes
                .entry(name)
                .or_insert_with(|| vec![0.0; image_len]);

            for (row, source) in channels.chunks_exact(region_row).enumerate() {
                let start = (region.y as usize + row) * image_row + region.x as usize * 4;
                target[start..start + region_row].copy_from_slice(source);
            }
        }
    }

    pub fn resolution(&self) -> Option<Resolution> {
        Resolution::new(self.width, self.height).ok()
    }

    pub fn pass(&self, name: &str) -> Option<&[f32]> {
        self.passes.get(name).map(Vec::as_slice)
    }

    pub fn combined(&self) -> Option<&[f32]> {
        self.pass(COMBINED_PASS)
    }

    /// Convert the Combined pass to an image with the usual top to bottom row
    /// order.
    pub fn to_rgba_image(&self) -> Option<image::Rgba32FImage> {
        let combined = self.combined()?;
        let row = self.width as usize * 4;

        let flipped: Vec<f32> = combined
            .chunks_exact(row)
            .rev()
            .flatten()
            .copied()
            .collect();

        image::Rgba32FImage::from_raw(self.width, self.height, flipped)
    }
}

impl FrameAssembler for ResultImage {
    fn assemble(&mut self, pixels: &PixelBuffer) {
        // Each request replaces the whole image, whatever size it had before.
        if self.resolution() != Some(pixels.resolution()) {
            self.reset(pixels.resolution());
        }

        let mut result = self.begin_result(ResultRegion::full(pixels.resolution()));

        if let Some(combined) = result.pass_mut(COMBINED_PASS) {
            combined.copy_from_slice(pixels.channels());
        }

        self.end_result(result);
    }
}
