// Copyright (C) 2025, Rafael Caricio <rafael@caricio.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use gst::glib;
use gst::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to initialize GStreamer: {0}")]
    Init(#[source] glib::Error),

    #[error("Invalid value {value:?} for {option}")]
    InvalidOption { option: String, value: String },

    #[error("Missing value for {0}")]
    MissingOptionValue(String),

    #[error("Failed to write startup banner: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create element {factory}: {error}")]
    ElementCreation {
        factory: &'static str,
        #[source]
        error: glib::BoolError,
    },

    #[error("Path {} is not valid UTF-8", .0.display())]
    InvalidPath(std::path::PathBuf),

    #[error("Output {name} {value} is out of range")]
    InvalidDimension { name: &'static str, value: u32 },

    #[error("Stream ended before a frame was decoded")]
    NoFrame,

    #[error("No source element handles URI {uri}: {error}")]
    InvalidUri {
        uri: String,
        #[source]
        error: glib::Error,
    },

    #[error("Failed to assemble pipeline: {0}")]
    Link(#[from] glib::BoolError),

    #[error("Pipeline state change failed: {0}")]
    StateChange(#[from] gst::StateChangeError),

    #[error("Error from {element}: {message} ({debug})")]
    Stream {
        element: String,
        message: String,
        debug: String,
    },

    #[error("Pipeline did not finish within {0}")]
    Timeout(gst::ClockTime),

    #[error("Pipeline has no bus")]
    NoBus,
}

impl Error {
    pub(crate) fn from_error_message(err: &gst::message::Error) -> Self {
        Error::Stream {
            element: err
                .src()
                .map(|s| s.path_string().to_string())
                .unwrap_or_else(|| String::from("unknown element")),
            message: err.error().to_string(),
            debug: err.debug().map(|d| d.to_string()).unwrap_or_default(),
        }
    }
}
