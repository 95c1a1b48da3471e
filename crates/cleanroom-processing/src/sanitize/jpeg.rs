//! JPEG sanitizer
//!
//! The image is fully decoded once to prove it is a valid JPEG within the
//! decode limits. The output is then rebuilt from an allowlist of segments
//! that carry pixel data; the entropy-coded scans are copied as-is, so pixels
//! are identical to the input. The JFIF and Adobe headers are regenerated
//! from their fixed fields, and nothing after EOI is carried over.

use super::DecodeLimits;
use crate::traits::{ContentSanitizer, SanitizeError, SanitizeOutcome};
use bytes::{BufMut, Bytes, BytesMut};
use cleanroom_core::ContentKind;
use cleanroom_storage::StagedContent;
use image::{ImageFormat, ImageReader, Limits};
use img_parts::jpeg::markers::{
    APP0, APP14, DAC, DHT, DNL, DQT, DRI, EOI, P, RST0, RST7, SOF0, SOF15, SOI, SOS,
};
use img_parts::jpeg::{Jpeg, JpegSegment};
use std::io::Cursor;

const JFIF_ID: &[u8] = b"JFIF\0";
const ADOBE_ID: &[u8] = b"Adobe";
const TEM: u8 = 0x01;

pub struct JpegSanitizer {
    limits: DecodeLimits,
}

impl JpegSanitizer {
    pub fn new(limits: DecodeLimits) -> Self {
        Self { limits }
    }

    fn validate(&self, data: &[u8]) -> Result<(), SanitizeError> {
        let (width, height) = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg)
            .into_dimensions()
            .map_err(|e| SanitizeError::Decode(e.to_string()))?;
        self.limits.check_dimensions(width, height)?;

        let mut limits = Limits::default();
        limits.max_alloc = Some(self.limits.max_alloc_bytes());

        let mut reader = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg);
        reader.limits(limits);
        reader
            .decode()
            .map_err(|e| SanitizeError::Decode(e.to_string()))?;
        Ok(())
    }
}

/// SOFn markers; 0xC4 (DHT), 0xC8 (JPG) and 0xCC (DAC) share the range.
fn is_frame_marker(marker: u8) -> bool {
    (SOF0..=SOF15).contains(&marker) && !matches!(marker, DHT | 0xC8 | DAC)
}

/// Table segments allowed before the first scan.
fn is_header_table(marker: u8) -> bool {
    is_frame_marker(marker) || matches!(marker, DHT | DAC | DQT | DRI)
}

/// Segments allowed between scans of a progressive or multi-scan image.
fn is_scan_table(marker: u8) -> bool {
    matches!(marker, DHT | DAC | DQT | DRI | DNL | SOS)
}

/// JFIF header with the original version, units and density and no thumbnail.
fn jfif_header(contents: &[u8]) -> Option<JpegSegment> {
    if contents.len() < 12 || !contents.starts_with(JFIF_ID) {
        return None;
    }
    let mut header = BytesMut::with_capacity(14);
    header.put_slice(JFIF_ID);
    header.put_slice(&contents[5..12]);
    header.put_u8(0);
    header.put_u8(0);
    Some(JpegSegment::new_with_contents(APP0, header.freeze()))
}

/// Adobe header carrying only the colour transform flag.
fn adobe_header(contents: &[u8]) -> Option<JpegSegment> {
    if contents.len() < 12 || !contents.starts_with(ADOBE_ID) {
        return None;
    }
    let mut header = BytesMut::with_capacity(12);
    header.put_slice(ADOBE_ID);
    header.put_u16(100);
    header.put_u16(0);
    header.put_u16(0);
    header.put_u8(contents[11]);
    Some(JpegSegment::new_with_contents(APP14, header.freeze()))
}

/// Rebuilt form of a segment preceding the first scan, or `None` to drop it.
fn rebuild_header_segment(segment: &JpegSegment) -> Option<JpegSegment> {
    match segment.marker() {
        APP0 => jfif_header(segment.contents()),
        APP14 => adobe_header(segment.contents()),
        marker if is_header_table(marker) => Some(segment.clone()),
        _ => None,
    }
}

/// Copy scan data and allowed inter-scan segments up to and including EOI.
///
/// `data` starts right after the first SOS header. Byte-stuffed `FF 00`
/// pairs and RST markers belong to the scan. Any other marker ends the
/// current scan; its segment is kept only if it is a scan table.
fn rebuild_scans(data: &[u8]) -> Result<(Bytes, usize), SanitizeError> {
    let truncated = || SanitizeError::Decode("JPEG scan data is truncated".to_string());

    let mut out = BytesMut::with_capacity(data.len());
    let mut run_start = 0;
    let mut pos = 0;
    let mut dropped = 0;

    while pos < data.len() {
        if data[pos] != P {
            pos += 1;
            continue;
        }

        let mut next = pos + 1;
        while next < data.len() && data[next] == P {
            next += 1;
        }
        let Some(&marker) = data.get(next) else {
            break;
        };

        if marker == 0x00 || (RST0..=RST7).contains(&marker) {
            pos = next + 1;
            continue;
        }

        out.put_slice(&data[run_start..pos]);

        if marker == EOI {
            out.put_slice(&[P, EOI]);
            return Ok((out.freeze(), dropped));
        }

        if matches!(marker, TEM | SOI) {
            pos = next + 1;
            run_start = pos;
            dropped += 1;
            continue;
        }

        let len_at = next + 1;
        let len_bytes = data.get(len_at..len_at + 2).ok_or_else(truncated)?;
        let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
        let end = len_at + len;
        if len < 2 || end > data.len() {
            return Err(truncated());
        }

        if is_scan_table(marker) {
            out.put_slice(&[P, marker]);
            out.put_slice(&data[len_at..end]);
        } else {
            dropped += 1;
        }

        pos = end;
        run_start = end;
    }

    // The decoder accepted the image without an EOI marker.
    out.put_slice(&data[run_start..pos]);
    out.put_slice(&[P, EOI]);
    Ok((out.freeze(), dropped))
}

impl ContentSanitizer for JpegSanitizer {
    fn kind(&self) -> ContentKind {
        ContentKind::Jpeg
    }

    fn sanitize(&self, content: &StagedContent) -> Result<SanitizeOutcome, SanitizeError> {
        let data = content.to_bytes()?;
        self.validate(&data)?;

        let mut jpeg =
            Jpeg::from_bytes(data.clone()).map_err(|e| SanitizeError::Decode(e.to_string()))?;

        let segments = std::mem::take(jpeg.segments_mut());
        let before = segments.len();
        let mut rebuilt = Vec::with_capacity(before);
        let mut scan_dropped = 0;

        for segment in &segments {
            if segment.marker() == SOS {
                // Everything from the first scan to the end of input.
                let tail = segment.clone().encoder().bytes();
                let header_len = 4 + segment.contents().len();
                let (scans, dropped) = rebuild_scans(&tail[header_len..])?;
                scan_dropped = dropped;
                rebuilt.push(JpegSegment::new_with_entropy(
                    SOS,
                    segment.contents().clone(),
                    scans,
                ));
                break;
            }
            if let Some(kept) = rebuild_header_segment(segment) {
                rebuilt.push(kept);
            }
        }

        if !rebuilt.iter().any(|s| s.marker() == SOS) {
            return Err(SanitizeError::Decode("JPEG has no scan".to_string()));
        }

        let dropped = before.saturating_sub(rebuilt.len()) + scan_dropped;
        *jpeg.segments_mut() = rebuilt;
        let output = jpeg.encoder().bytes();

        tracing::debug!(
            dropped_segments = dropped,
            input_bytes = data.len(),
            output_bytes = output.len(),
            "JPEG container rebuilt"
        );

        Ok(SanitizeOutcome::Rewritten(output))
    }
}
