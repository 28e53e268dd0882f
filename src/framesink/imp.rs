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
use gst_base::prelude::*;
use gst_base::subclass::prelude::*;
use once_cell::sync::Lazy;
use std::sync::Mutex;

use super::{Frame, FrameHandler, FINISHED_MESSAGE};

static CAT: Lazy<gst::DebugCategory> = Lazy::new(|| {
    gst::DebugCategory::new(
        "framesink",
        gst::DebugColorFlags::empty(),
        Some("Video Frame Sink Element"),
    )
});

const MAX_FRAMES_DEFAULT: u64 = 0;

// Streaming state, reset on start/stop
#[derive(Default)]
struct State {
    video_info: Option<gst_video::VideoInfo>,
    frames_rendered: u64,
    finished: bool,
}

// Properties
#[derive(Debug, Clone)]
struct Settings {
    max_frames: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_frames: MAX_FRAMES_DEFAULT,
        }
    }
}

#[derive(Default)]
pub struct FrameSink {
    settings: Mutex<Settings>,
    state: Mutex<State>,
    handler: Mutex<Option<FrameHandler>>,
}

impl FrameSink {
    pub(super) fn set_handler(&self, handler: Option<FrameHandler>) {
        *self.handler.lock().unwrap() = handler;
    }

    fn post_finished(&self, frames: u64) {
        let structure = gst::Structure::builder(FINISHED_MESSAGE)
            .field("frames", frames)
            .build();
        let msg = gst::message::Element::builder(structure)
            .src(&*self.obj())
            .build();

        if self.obj().post_message(msg).is_err() {
            gst::warning!(CAT, imp = self, "Failed to post {} message", FINISHED_MESSAGE);
        }
    }

    // Marks the stream as done. Returns false if it already was.
    fn finish(&self, state: &mut State) -> bool {
        if state.finished {
            return false;
        }
        state.finished = true;
        true
    }
}

#[glib::object_subclass]
impl ObjectSubclass for FrameSink {
    const NAME: &'static str = "FrameExtractorFrameSink";
    type Type = super::FrameSink;
    type ParentType = gst_base::BaseSink;
}

impl ObjectImpl for FrameSink {
    fn properties() -> &'static [glib::ParamSpec] {
        static PROPERTIES: Lazy<Vec<glib::ParamSpec>> = Lazy::new(|| {
            vec![
                glib::ParamSpecUInt64::builder("max-frames")
                    .nick("Max frames")
                    .blurb("Number of frames to hand out before ending the stream (0 = unlimited)")
                    .default_value(MAX_FRAMES_DEFAULT)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecUInt64::builder("frames-rendered")
                    .nick("Frames rendered")
                    .blurb("Number of frames handed out since the sink was started")
                    .read_only()
                    .build(),
            ]
        });

        PROPERTIES.as_ref()
    }

    fn set_property(&self, _id: usize, value: &glib::Value, pspec: &glib::ParamSpec) {
        let mut settings = self.settings.lock().unwrap();
        match pspec.name() {
            "max-frames" => {
                settings.max_frames = value.get().expect("type checked upstream");
                gst::debug!(CAT, imp = self, "max-frames set to {}", settings.max_frames);
            }
            _ => unimplemented!(),
        }
    }

    fn property(&self, _id: usize, pspec: &glib::ParamSpec) -> glib::Value {
        match pspec.name() {
            "max-frames" => self.settings.lock().unwrap().max_frames.to_value(),
            "frames-rendered" => self.state.lock().unwrap().frames_rendered.to_value(),
            _ => unimplemented!(),
        }
    }

    fn constructed(&self) {
        self.parent_constructed();

        // Frames are pulled as fast as the decoder produces them
        self.obj().set_sync(false);
    }
}

impl GstObjectImpl for FrameSink {}

impl ElementImpl for FrameSink {
    fn metadata() -> Option<&'static gst::subclass::ElementMetadata> {
        static ELEMENT_METADATA: Lazy<gst::subclass::ElementMetadata> = Lazy::new(|| {
            gst::subclass::ElementMetadata::new(
                "Video Frame Sink",
                "Sink/Video",
                "Hands decoded raw video frames to an application callback",
                "Rafael Caricio <rafael@caricio.com>",
            )
        });

        Some(&*ELEMENT_METADATA)
    }

    fn pad_templates() -> &'static [gst::PadTemplate] {
        static PAD_TEMPLATES: Lazy<Vec<gst::PadTemplate>> = Lazy::new(|| {
            let caps = gst_video::VideoCapsBuilder::new()
                .format_list(gst_video::VideoFormat::iter_raw())
                .build();

            let sink_pad_template = gst::PadTemplate::new(
                "sink",
                gst::PadDirection::Sink,
                gst::PadPresence::Always,
                &caps,
            )
            .unwrap();

            vec![sink_pad_template]
        });

        PAD_TEMPLATES.as_ref()
    }
}

impl BaseSinkImpl for FrameSink {
    fn set_caps(&self, caps: &gst::Caps) -> Result<(), gst::LoggableError> {
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|_| gst::loggable_error!(CAT, "Failed to parse caps {}", caps))?;

        gst::debug!(
            CAT,
            imp = self,
            "Negotiated {}x{} {:?}",
            info.width(),
            info.height(),
            info.format()
        );
        self.state.lock().unwrap().video_info = Some(info);
        Ok(())
    }

    fn start(&self) -> Result<(), gst::ErrorMessage> {
        *self.state.lock().unwrap() = State::default();

        gst::info!(CAT, imp = self, "Started");
        Ok(())
    }

    fn stop(&self) -> Result<(), gst::ErrorMessage> {
        let mut state = self.state.lock().unwrap();
        state.video_info = None;

        gst::info!(
            CAT,
            imp = self,
            "Stopped after {} frames",
            state.frames_rendered
        );
        Ok(())
    }

    fn render(&self, buffer: &gst::Buffer) -> Result<gst::FlowSuccess, gst::FlowError> {
        let max_frames = self.settings.lock().unwrap().max_frames;

        let (info, index) = {
            let state = self.state.lock().unwrap();

            let Some(ref info) = state.video_info else {
                gst::error!(CAT, imp = self, "Video info not set");
                return Err(gst::FlowError::NotNegotiated);
            };

            if state.finished {
                return Err(gst::FlowError::Eos);
            }

            (info.clone(), state.frames_rendered)
        };

        // Map buffer for reading
        let video_frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info)
            .map_err(|_| {
                gst::error!(CAT, imp = self, "Failed to map buffer readable");
                gst::FlowError::Error
            })?;

        let frame = Frame::new(index, video_frame);
        let ret = match self.handler.lock().unwrap().as_mut() {
            Some(handler) => handler(&frame),
            None => Ok(gst::FlowSuccess::Ok),
        };

        let mut state = self.state.lock().unwrap();
        match ret {
            Ok(success) => {
                state.frames_rendered += 1;
                gst::trace!(
                    CAT,
                    imp = self,
                    "Rendered frame {} with pts {}",
                    index,
                    buffer.pts().display()
                );

                if max_frames > 0 && state.frames_rendered >= max_frames && self.finish(&mut state) {
                    let frames = state.frames_rendered;
                    drop(state);
                    gst::info!(CAT, imp = self, "Reached max-frames ({})", max_frames);
                    self.post_finished(frames);
                }

                Ok(success)
            }
            Err(gst::FlowError::Eos) => {
                state.frames_rendered += 1;
                if self.finish(&mut state) {
                    let frames = state.frames_rendered;
                    drop(state);
                    gst::info!(CAT, imp = self, "Frame handler ended the stream at frame {}", index);
                    self.post_finished(frames);
                }

                Err(gst::FlowError::Eos)
            }
            Err(err) => {
                gst::error!(CAT, imp = self, "Frame handler failed on frame {}: {:?}", index, err);
                Err(err)
            }
        }
    }
}
