// Copyright (C) 2025, Rafael Caricio <rafael@caricio.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use gst::glib;
use gst::prelude::*;
use gst::subclass::prelude::*;
use gst_video::prelude::*;

mod imp;

/// Name of the element message `framesink` posts once it stops accepting
/// frames, either because `max-frames` was reached or because the frame
/// handler returned [`gst::FlowError::Eos`]. Carries a `frames` (u64) field.
pub const FINISHED_MESSAGE: &str = "framesink-finished";

/// Callback invoked on the streaming thread for every decoded frame.
///
/// Returning `Err(gst::FlowError::Eos)` ends the stream after this frame, any
/// other error is reported on the bus as a streaming error.
pub type FrameHandler =
    Box<dyn FnMut(&Frame<'_>) -> Result<gst::FlowSuccess, gst::FlowError> + Send + 'static>;

glib::wrapper! {
    pub struct FrameSink(ObjectSubclass<imp::FrameSink>) @extends gst_base::BaseSink, gst::Element, gst::Object;
}

impl FrameSink {
    pub fn new(name: Option<&str>) -> Self {
        let mut builder = glib::Object::builder::<FrameSink>();
        if let Some(name) = name {
            builder = builder.property("name", name);
        }
        builder.build()
    }

    /// Installs the callback frames are handed to, replacing any previous one.
    pub fn set_frame_handler<F>(&self, handler: F)
    where
        F: FnMut(&Frame<'_>) -> Result<gst::FlowSuccess, gst::FlowError> + Send + 'static,
    {
        self.imp().set_handler(Some(Box::new(handler)));
    }

    pub fn clear_frame_handler(&self) {
        self.imp().set_handler(None);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.property("frames-rendered")
    }

    pub fn set_max_frames(&self, max_frames: u64) {
        self.set_property("max-frames", max_frames);
    }
}

/// A decoded video frame, mapped readable for the duration of the callback.
pub struct Frame<'a> {
    index: u64,
    frame: gst_video::VideoFrameRef<&'a gst::BufferRef>,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(index: u64, frame: gst_video::VideoFrameRef<&'a gst::BufferRef>) -> Self {
        Frame { index, frame }
    }

    /// Position of this frame in the stream, starting at 0.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn pts(&self) -> Option<gst::ClockTime> {
        self.frame.buffer().pts()
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn format(&self) -> gst_video::VideoFormat {
        self.frame.format()
    }

    pub fn info(&self) -> &gst_video::VideoInfo {
        self.frame.info()
    }

    pub fn n_planes(&self) -> u32 {
        self.frame.n_planes()
    }

    pub fn plane_data(&self, plane: u32) -> Option<&[u8]> {
        self.frame.plane_data(plane).ok()
    }

    /// Row stride of `plane` in bytes.
    pub fn plane_stride(&self, plane: u32) -> Option<usize> {
        self.frame
            .plane_stride()
            .get(plane as usize)
            .map(|stride| *stride as usize)
    }
}

pub fn register(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    gst::Element::register(
        Some(plugin),
        "framesink",
        gst::Rank::NONE,
        FrameSink::static_type(),
    )
}

pub fn register_element() -> Result<(), glib::BoolError> {
    gst::Element::register(
        None,
        "framesink",
        gst::Rank::NONE,
        FrameSink::static_type(),
    )
}
