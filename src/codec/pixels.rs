use tracing::debug;

use super::CodecError;
use crate::{platform::Stopwatch, snapshot::Resolution};

/// A rendered RGBA image as returned by the external renderer.
///
/// Channel values are stored flat and row-major with rows ordered bottom to
/// top, the layout the host's result images use.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    resolution: Resolution,
    channels: Vec<f32>,
}

impl PixelBuffer {
    /// Wrap `channels` as an image, rejecting any length other than
    /// `width * height * 4`.
    pub fn new(resolution: Resolution, channels: Vec<f32>) -> Result<Self, CodecError> {
        let expected = resolution.channel_count();

        if channels.len() != expected {
            return Err(CodecError::PixelCountMismatch {
                resolution,
                expected,
                actual: channels.len(),
            });
        }

        Ok(Self {
            resolution,
            channels,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Get the flat RGBA channel values.
    pub fn channels(&self) -> &[f32] {
        &self.channels
    }

    /// Iterate over each pixel as `[r, g, b, a]`.
    pub fn pixels(&self) -> impl Iterator<Item = [f32; 4]> + '_ {
        self.channels
            .chunks_exact(4)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }
}

/// Decode the accumulated response stream of the external renderer.
///
/// The payload is UTF-8 text holding one JSON array of numbers. Whitespace
/// around the array is ignored and an empty payload is read as an empty
/// array, which then fails the size check like any other short image.
pub fn decode_pixels(payload: &[u8], resolution: Resolution) -> Result<PixelBuffer, CodecError> {
    let started = Stopwatch::start();
    let text = std::str::from_utf8(payload)?.trim();

    let channels: Vec<f32> = if text.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(text).map_err(CodecError::MalformedPixels)?
    };

    debug!(
        "parsed {} pixel channel values in {:?}",
        channels.len(),
        started.elapsed()
    );

    PixelBuffer::new(resolution, channels)
}
