// Copyright (C) 2025, Rafael Caricio <rafael@caricio.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context};
use clap::Parser;
use gst::prelude::*;
use gstframeextractor::thumbnail::DEFAULT_THUMBNAIL_HEIGHT;
use gstframeextractor::{extract_thumbnail, initialize_from_env, DecoderPipeline, Source};

/// Decode a video with GStreamer and report the frames it contains.
///
/// GStreamer options such as --gst-debug=LIST, --gst-debug-level=N and
/// --gst-plugin-path=PATHS are accepted before or after the location.
#[derive(Parser, Debug)]
#[command(name = "gst-frame-extractor", version)]
struct Cli {
    /// File path or URI of the video
    location: String,

    /// Raw video format frames are converted to
    #[arg(long, default_value = "RGBA")]
    format: String,

    /// Scale frames to this width
    #[arg(long)]
    width: Option<u32>,

    /// Scale frames to this height
    #[arg(long)]
    height: Option<u32>,

    /// Stop after this many frames (0 = all)
    #[arg(long, default_value_t = 0)]
    max_frames: u64,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Deliver frames in real time instead of as fast as possible
    #[arg(long)]
    sync: bool,

    /// Write a thumbnail of the first frame to this image file instead
    #[arg(long, value_name = "PATH")]
    thumbnail: Option<PathBuf>,

    /// Height of the thumbnail in pixels
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_HEIGHT)]
    thumbnail_height: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let (initialized, args) = initialize_from_env()?;
    let cli = Cli::parse_from(args);

    let format = gst_video::VideoFormat::from_str(&cli.format)
        .ok()
        .filter(|format| *format != gst_video::VideoFormat::Unknown)
        .with_context(|| format!("Unknown video format {}", cli.format))?;

    let source = Source::from_location(&cli.location);
    if let Source::File(ref path) = source {
        if !path.exists() {
            bail!("{} does not exist", path.display());
        }
    }

    if let Some(ref output) = cli.thumbnail {
        let thumbnail = extract_thumbnail(&initialized, source, output, cli.thumbnail_height)
            .with_context(|| format!("Failed to extract thumbnail from {}", cli.location))?;
        println!(
            "Wrote {}x{} thumbnail to {}",
            thumbnail.width,
            thumbnail.height,
            thumbnail.path.display()
        );
        return Ok(());
    }

    let mut builder = DecoderPipeline::builder(&initialized, source)
        .format(format)
        .sync(cli.sync)
        .max_frames(cli.max_frames)
        .on_frame(|frame| {
            log::debug!(
                "frame {}: {}x{} {:?} pts {} ({} bytes in plane 0)",
                frame.index(),
                frame.width(),
                frame.height(),
                frame.format(),
                frame.pts().display(),
                frame.plane_data(0).map(|data| data.len()).unwrap_or(0)
            );
            Ok(gst::FlowSuccess::Ok)
        });

    if let Some(width) = cli.width {
        builder = builder.width(width);
    }
    if let Some(height) = cli.height {
        builder = builder.height(height);
    }
    if let Some(timeout) = cli.timeout {
        builder = builder.timeout(gst::ClockTime::from_seconds(timeout));
    }

    let pipeline = builder
        .build()
        .with_context(|| format!("Failed to build pipeline for {}", cli.location))?;

    let stop = pipeline.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("Interrupted, finishing stream");
        if !stop.stop() {
            log::warn!("Pipeline did not accept EOS");
        }
    })?;

    log::info!("Decoding {}", cli.location);
    let summary = pipeline.run()?;

    println!(
        "Decoded {} frames in {:.2?}{}",
        summary.frames,
        summary.elapsed,
        if summary.end_of_stream {
            ""
        } else {
            " (stopped early)"
        }
    );

    Ok(())
}
