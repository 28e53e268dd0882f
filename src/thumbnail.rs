// Copyright (C) 2025, Rafael Caricio <rafael@caricio.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Single frame snapshots scaled down to a thumbnail image.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use gst::prelude::*;
use once_cell::sync::Lazy;

use crate::bootstrap::Initialized;
use crate::error::Error;
use crate::framesink::Frame;
use crate::pipeline::{DecoderPipeline, Source};

static CAT: Lazy<gst::DebugCategory> = Lazy::new(|| {
    gst::DebugCategory::new(
        "thumbnail",
        gst::DebugColorFlags::empty(),
        Some("Video thumbnail extraction"),
    )
});

pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 240;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Width of a thumbnail `target_height` pixels high that keeps the display
/// aspect ratio of a `width`x`height` frame with the given pixel aspect ratio.
pub fn scaled_width(width: u32, height: u32, par: gst::Fraction, target_height: u32) -> u32 {
    if height == 0 || par.denom() == 0 {
        return target_height.max(1);
    }

    let display_aspect_ratio = (width as f64 * par.numer() as f64) / (height as f64 * par.denom() as f64);
    ((target_height as f64 * display_aspect_ratio).round() as u32).max(1)
}

// Frames arrive as RGBx, the padding byte is skipped through the layout
fn save_frame(frame: &Frame<'_>, target_height: u32, output: &Path) -> Result<(u32, u32), String> {
    let samples = frame.plane_data(0).ok_or("Frame has no data")?;
    let stride = frame.plane_stride(0).ok_or("Frame has no stride")?;

    let img = image::FlatSamples::<&[u8]> {
        samples,
        layout: image::flat::SampleLayout {
            channels: 3,
            channel_stride: 1,
            width: frame.width(),
            width_stride: 4,
            height: frame.height(),
            height_stride: stride,
        },
        color_hint: Some(image::ColorType::Rgb8),
    };
    let view = img
        .as_view::<image::Rgb<u8>>()
        .map_err(|err| format!("Invalid frame layout: {err}"))?;

    let width = scaled_width(frame.width(), frame.height(), frame.info().par(), target_height);
    let scaled = image::imageops::thumbnail(&view, width, target_height);
    scaled.save(output).map_err(|err| err.to_string())?;

    Ok((scaled.width(), scaled.height()))
}

/// Decodes the first video frame of `source` and writes it to `output`,
/// scaled to `target_height` pixels high. The image format follows the
/// file extension.
pub fn extract_thumbnail(
    initialized: &Initialized,
    source: Source,
    output: impl AsRef<Path>,
    target_height: u32,
) -> Result<Thumbnail, Error> {
    let output = output.as_ref().to_path_buf();
    let target_height = target_height.max(1);

    let pipeline = DecoderPipeline::builder(initialized, source)
        .format(gst_video::VideoFormat::Rgbx)
        .max_frames(1)
        .build()?;

    let size = Arc::new(Mutex::new(None));
    let sink_weak = pipeline.frame_sink().downgrade();
    pipeline.frame_sink().set_frame_handler({
        let size = size.clone();
        let output = output.clone();
        move |frame| {
            gst::debug!(CAT, "Have video frame {}x{}", frame.width(), frame.height());

            match save_frame(frame, target_height, &output) {
                Ok(dimensions) => {
                    *size.lock().unwrap() = Some(dimensions);
                    Ok(gst::FlowSuccess::Ok)
                }
                Err(err) => {
                    if let Some(sink) = sink_weak.upgrade() {
                        gst::element_error!(
                            sink,
                            gst::ResourceError::Write,
                            ("Failed to write thumbnail file {}: {}", output.display(), err)
                        );
                    }
                    Err(gst::FlowError::Error)
                }
            }
        }
    });

    pipeline.run()?;

    let Some((width, height)) = size.lock().unwrap().take() else {
        return Err(Error::NoFrame);
    };

    gst::info!(CAT, "Wrote {}x{} thumbnail to {}", width, height, output.display());
    Ok(Thumbnail {
        path: output,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_width_square_pixels() {
        assert_eq!(scaled_width(1920, 1080, gst::Fraction::new(1, 1), 240), 427);
        assert_eq!(scaled_width(320, 240, gst::Fraction::new(1, 1), 60), 80);
    }

    #[test]
    fn test_scaled_width_anamorphic() {
        // 720x576 PAL with 16:15 pixels displays as 4:3
        assert_eq!(scaled_width(720, 576, gst::Fraction::new(16, 15), 240), 320);
    }

    #[test]
    fn test_scaled_width_degenerate() {
        assert_eq!(scaled_width(320, 0, gst::Fraction::new(1, 1), 60), 60);
        assert_eq!(scaled_width(1, 1000, gst::Fraction::new(1, 1), 10), 1);
    }
}
