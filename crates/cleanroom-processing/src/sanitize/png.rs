//! PNG sanitizer: decode the raw samples, then write a brand-new PNG that
//! contains only the critical chunks plus the transparency table.
//!
//! Animated PNGs are reduced to their default image; the remaining frames
//! are dropped with a warning.

use super::DecodeLimits;
use crate::traits::{ContentSanitizer, SanitizeError, SanitizeOutcome};
use bytes::Bytes;
use cleanroom_core::ContentKind;
use cleanroom_storage::StagedContent;
use png::{Decoder, Encoder, Transformations};

pub struct PngSanitizer {
    limits: DecodeLimits,
}

/// Decoded image with exactly what is needed to re-encode it losslessly.
struct RawImage {
    width: u32,
    height: u32,
    color_type: png::ColorType,
    bit_depth: png::BitDepth,
    palette: Option<Vec<u8>>,
    trns: Option<Vec<u8>>,
    samples: Vec<u8>,
    /// Frame count declared by `acTL`, for animated input.
    animation_frames: Option<u32>,
}

impl PngSanitizer {
    pub fn new(limits: DecodeLimits) -> Self {
        Self { limits }
    }

    fn decode(&self, data: &[u8]) -> Result<RawImage, SanitizeError> {
        let bytes = usize::try_from(self.limits.max_alloc_bytes()).unwrap_or(usize::MAX);
        let mut decoder = Decoder::new_with_limits(data, png::Limits { bytes });
        decoder.set_transformations(Transformations::IDENTITY);

        let mut reader = decoder
            .read_info()
            .map_err(|e| SanitizeError::Decode(e.to_string()))?;

        let (width, height, palette, trns, animation_frames) = {
            let info = reader.info();
            (
                info.width,
                info.height,
                info.palette.as_ref().map(|p| p.to_vec()),
                info.trns.as_ref().map(|t| t.to_vec()),
                info.animation_control.map(|control| control.num_frames),
            )
        };
        self.limits.check_dimensions(width, height)?;

        let mut samples = vec![0u8; reader.output_buffer_size()];
        let frame = reader
            .next_frame(&mut samples)
            .map_err(|e| SanitizeError::Decode(e.to_string()))?;
        samples.truncate(frame.buffer_size());

        Ok(RawImage {
            width: frame.width,
            height: frame.height,
            color_type: frame.color_type,
            bit_depth: frame.bit_depth,
            palette,
            trns,
            samples,
            animation_frames,
        })
    }

    fn encode(image: &RawImage) -> Result<Vec<u8>, SanitizeError> {
        let mut out = Vec::with_capacity(image.samples.len() / 2);
        {
            let mut encoder = Encoder::new(&mut out, image.width, image.height);
            encoder.set_color(image.color_type);
            encoder.set_depth(image.bit_depth);
            if let Some(palette) = &image.palette {
                encoder.set_palette(palette.clone());
            }
            if let Some(trns) = &image.trns {
                encoder.set_trns(trns.clone());
            }

            let mut writer = encoder
                .write_header()
                .map_err(|e| SanitizeError::Encode(e.to_string()))?;
            writer
                .write_image_data(&image.samples)
                .map_err(|e| SanitizeError::Encode(e.to_string()))?;
            writer
                .finish()
                .map_err(|e| SanitizeError::Encode(e.to_string()))?;
        }
        Ok(out)
    }
}

impl ContentSanitizer for PngSanitizer {
    fn kind(&self) -> ContentKind {
        ContentKind::Png
    }

    fn sanitize(&self, content: &StagedContent) -> Result<SanitizeOutcome, SanitizeError> {
        let data = content.to_bytes()?;
        let image = self.decode(&data)?;
        let output = Self::encode(&image)?;

        if let Some(frames) = image.animation_frames {
            tracing::warn!(
                frames,
                width = image.width,
                height = image.height,
                "Animated PNG reduced to its default image"
            );
        }

        tracing::debug!(
            width = image.width,
            height = image.height,
            color_type = ?image.color_type,
            input_bytes = data.len(),
            output_bytes = output.len(),
            "PNG re-encoded"
        );

        Ok(SanitizeOutcome::Rewritten(Bytes::from(output)))
    }
}
