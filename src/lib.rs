// Copyright (C) 2025, Rafael Caricio <rafael@caricio.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Decodes videos with GStreamer and hands every frame to Rust code.
//!
//! Call [`bootstrap::initialize`] once at startup, then build a
//! [`DecoderPipeline`] per video.

pub mod bootstrap;
mod error;
pub mod framesink;
pub mod pipeline;
pub mod thumbnail;
pub mod version;

use gst::glib;

pub use bootstrap::{initialize, initialize_from_env, GstOptions, Initialized};
pub use error::Error;
pub use framesink::{Frame, FrameSink};
pub use pipeline::{DecoderPipeline, DecoderPipelineBuilder, DecoderSettings, RunSummary, Source, StopHandle};
pub use thumbnail::{extract_thumbnail, Thumbnail};
pub use version::{Maturity, Version};

// Used for testing to directly register the element without requiring the plugin loading
pub fn register_element() -> Result<(), glib::BoolError> {
    framesink::register_element()
}

fn plugin_init(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    framesink::register(plugin)
}

gst::plugin_define!(
    frameextractor,
    env!("CARGO_PKG_DESCRIPTION"),
    plugin_init,
    concat!(env!("CARGO_PKG_VERSION"), "-", env!("COMMIT_ID")),
    "MPL",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_REPOSITORY"),
    env!("BUILD_REL_DATE")
);
