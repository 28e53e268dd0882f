// Copyright (C) 2025, Rafael Caricio <rafael@caricio.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Video decoding pipeline construction.
//!
//! The graph built here is
//!
//! ```text
//! source ! decodebin ! queue ! videoconvert ! videoscale ! capsfilter ! framesink
//! ```
//!
//! where the `decodebin` link is made when the first video pad shows up.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use gst::glib;
use gst::prelude::*;
use gst_base::prelude::*;
use once_cell::sync::Lazy;

use crate::bootstrap::Initialized;
use crate::error::Error;
use crate::framesink::{Frame, FrameHandler, FrameSink, FINISHED_MESSAGE};

static CAT: Lazy<gst::DebugCategory> = Lazy::new(|| {
    gst::DebugCategory::new(
        "decoderpipeline",
        gst::DebugColorFlags::empty(),
        Some("Video frame decoder pipeline"),
    )
});

/// Where the encoded video comes from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Local file, read with `filesrc`
    File(PathBuf),
    /// Any URI a registered source element can handle
    Uri(String),
    /// A caller-provided source element
    Element(gst::Element),
}

impl Source {
    /// Treats `location` as a URI when it has a scheme, as a file path otherwise.
    pub fn from_location(location: &str) -> Self {
        if location.contains("://") {
            Source::Uri(location.to_owned())
        } else {
            Source::File(PathBuf::from(location))
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecoderSettings {
    /// Raw format frames are converted to
    pub format: gst_video::VideoFormat,
    /// Output width, the decoded width when unset
    pub width: Option<u32>,
    /// Output height, the decoded height when unset
    pub height: Option<u32>,
    /// Render frames against the clock instead of as fast as possible
    pub sync: bool,
    /// 0 = unlimited
    pub max_frames: u64,
    pub timeout: Option<gst::ClockTime>,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        DecoderSettings {
            format: gst_video::VideoFormat::Rgba,
            width: None,
            height: None,
            sync: false,
            max_frames: 0,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames handed to the frame handler
    pub frames: u64,
    /// `false` when the run ended because of `max_frames` or the frame handler
    pub end_of_stream: bool,
    pub elapsed: Duration,
}

/// Ends a running pipeline from any thread by sending it EOS.
#[derive(Debug, Clone)]
pub struct StopHandle(glib::WeakRef<gst::Pipeline>);

impl StopHandle {
    /// Returns false if the pipeline is gone or did not accept the event.
    pub fn stop(&self) -> bool {
        match self.0.upgrade() {
            Some(pipeline) => pipeline.send_event(gst::event::Eos::new()),
            None => false,
        }
    }
}

pub struct DecoderPipelineBuilder {
    source: Source,
    settings: DecoderSettings,
    handler: Option<FrameHandler>,
}

impl DecoderPipelineBuilder {
    pub fn settings(mut self, settings: DecoderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn format(mut self, format: gst_video::VideoFormat) -> Self {
        self.settings.format = format;
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.settings.width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.settings.height = Some(height);
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.settings.sync = sync;
        self
    }

    pub fn max_frames(mut self, max_frames: u64) -> Self {
        self.settings.max_frames = max_frames;
        self
    }

    pub fn timeout(mut self, timeout: gst::ClockTime) -> Self {
        self.settings.timeout = Some(timeout);
        self
    }

    pub fn on_frame<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&Frame<'_>) -> Result<gst::FlowSuccess, gst::FlowError> + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> Result<DecoderPipeline, Error> {
        let DecoderPipelineBuilder {
            source,
            settings,
            handler,
        } = self;

        let pipeline = gst::Pipeline::with_name("frame-decoder");

        let source = match source {
            Source::File(path) => {
                let Some(location) = path.to_str() else {
                    return Err(Error::InvalidPath(path));
                };
                gst::ElementFactory::make("filesrc")
                    .name("source")
                    .property("location", location)
                    .build()
                    .map_err(|error| Error::ElementCreation {
                        factory: "filesrc",
                        error,
                    })?
            }
            Source::Uri(uri) => {
                match gst::Element::make_from_uri(gst::URIType::Src, &uri, Some("source")) {
                    Ok(element) => element,
                    Err(error) => return Err(Error::InvalidUri { uri, error }),
                }
            }
            Source::Element(element) => element,
        };

        let decodebin = make_element("decodebin", "decoder")?;
        let queue = make_element("queue", "queue")?;
        let convert = make_element("videoconvert", "convert")?;
        let scale = make_element("videoscale", "scale")?;
        let filter = make_element("capsfilter", "filter")?;

        let mut caps = gst_video::VideoCapsBuilder::new().format(settings.format);
        if let Some(width) = settings.width {
            caps = caps.width(caps_dimension("width", width)?);
        }
        if let Some(height) = settings.height {
            caps = caps.height(caps_dimension("height", height)?);
        }
        let caps = caps.build();
        gst::debug!(CAT, obj = &pipeline, "Output caps {}", caps);
        filter.set_property("caps", &caps);

        let sink = FrameSink::new(Some("sink"));
        sink.set_sync(settings.sync);
        sink.set_max_frames(settings.max_frames);
        if let Some(handler) = handler {
            sink.set_frame_handler(handler);
        }

        pipeline.add_many([
            &source,
            &decodebin,
            &queue,
            &convert,
            &scale,
            &filter,
            sink.upcast_ref::<gst::Element>(),
        ])?;
        gst::Element::link_many([&source, &decodebin])?;
        gst::Element::link_many([
            &queue,
            &convert,
            &scale,
            &filter,
            sink.upcast_ref::<gst::Element>(),
        ])?;

        let queue_weak = queue.downgrade();
        decodebin.connect_pad_added(move |dbin, src_pad| {
            let Some(queue) = queue_weak.upgrade() else {
                return;
            };

            let caps = src_pad
                .current_caps()
                .unwrap_or_else(|| src_pad.query_caps(None));
            let is_video = caps
                .structure(0)
                .map(|s| s.name().starts_with("video/"))
                .unwrap_or(false);

            if !is_video {
                gst::debug!(CAT, obj = dbin, "Ignoring pad {} with caps {}", src_pad.name(), caps);
                return;
            }

            let Some(sink_pad) = queue.static_pad("sink") else {
                gst::element_error!(dbin, gst::CoreError::Pad, ("Queue has no sink pad"));
                return;
            };

            // decodebin recreates its pads on every READY -> PAUSED, so the
            // queue's peer is the only reliable record of a linked stream
            if sink_pad.is_linked() {
                gst::debug!(CAT, obj = dbin, "Ignoring additional video pad {}", src_pad.name());
                return;
            }

            match src_pad.link(&sink_pad) {
                Ok(_) => {
                    gst::info!(CAT, obj = dbin, "Linked video pad {} with caps {}", src_pad.name(), caps);
                }
                Err(gst::PadLinkError::WasLinked) => {
                    gst::debug!(CAT, obj = dbin, "Ignoring additional video pad {}", src_pad.name());
                }
                Err(err) => {
                    gst::element_error!(
                        dbin,
                        gst::CoreError::Negotiation,
                        ("Failed to link video pad {}: {:?}", src_pad.name(), err)
                    );
                }
            }
        });

        let queue_weak = queue.downgrade();
        decodebin.connect_no_more_pads(move |dbin| {
            let linked = queue_weak
                .upgrade()
                .and_then(|queue| queue.static_pad("sink"))
                .map(|pad| pad.is_linked())
                .unwrap_or(false);

            if !linked {
                gst::element_error!(
                    dbin,
                    gst::StreamError::TypeNotFound,
                    ("No video stream found")
                );
            }
        });

        Ok(DecoderPipeline {
            pipeline,
            sink,
            timeout: settings.timeout,
        })
    }
}

fn caps_dimension(name: &'static str, value: u32) -> Result<i32, Error> {
    i32::try_from(value).map_err(|_| Error::InvalidDimension { name, value })
}

fn make_element(factory: &'static str, name: &str) -> Result<gst::Element, Error> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|error| Error::ElementCreation { factory, error })
}

/// Owning handle to a frame decoding pipeline.
///
/// The pipeline is returned to `Null` after every [`DecoderPipeline::run`]
/// and when the handle is dropped.
pub struct DecoderPipeline {
    pipeline: gst::Pipeline,
    sink: FrameSink,
    timeout: Option<gst::ClockTime>,
}

impl DecoderPipeline {
    pub fn builder(_initialized: &Initialized, source: Source) -> DecoderPipelineBuilder {
        DecoderPipelineBuilder {
            source,
            settings: DecoderSettings::default(),
            handler: None,
        }
    }

    pub fn pipeline(&self) -> &gst::Pipeline {
        &self.pipeline
    }

    pub fn frame_sink(&self) -> &FrameSink {
        &self.sink
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.pipeline.downgrade())
    }

    /// Plays the pipeline until end of stream, an error or the timeout.
    pub fn run(&self) -> Result<RunSummary, Error> {
        let bus = self.pipeline.bus().ok_or(Error::NoBus)?;
        let started = Instant::now();

        gst::info!(CAT, obj = &self.pipeline, "Starting pipeline");
        if let Err(err) = self.pipeline.set_state(gst::State::Playing) {
            // The element that failed usually posted the reason
            let error = match bus.pop_filtered(&[gst::MessageType::Error]) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Error(msg) => Error::from_error_message(msg),
                    _ => Error::StateChange(err),
                },
                None => Error::StateChange(err),
            };
            let _ = self.pipeline.set_state(gst::State::Null);
            return Err(error);
        }

        let result = self.wait_for_completion(&bus, started);
        let teardown = self.pipeline.set_state(gst::State::Null);
        let end_of_stream = result?;
        teardown?;

        let summary = RunSummary {
            frames: self.sink.frames_rendered(),
            end_of_stream,
            elapsed: started.elapsed(),
        };
        gst::info!(
            CAT,
            obj = &self.pipeline,
            "Finished after {} frames in {:?}",
            summary.frames,
            summary.elapsed
        );
        Ok(summary)
    }

    // Returns whether the stream ended with EOS.
    fn wait_for_completion(&self, bus: &gst::Bus, started: Instant) -> Result<bool, Error> {
        let deadline = self
            .timeout
            .map(|timeout| (timeout, started + Duration::from(timeout)));

        loop {
            let wait = match deadline {
                Some((timeout, deadline)) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        gst::warning!(CAT, obj = &self.pipeline, "Timed out after {}", timeout);
                        return Err(Error::Timeout(timeout));
                    }
                    Some(gst::ClockTime::from_nseconds(remaining.as_nanos() as u64))
                }
                None => gst::ClockTime::NONE,
            };

            let Some(msg) = bus.timed_pop_filtered(
                wait,
                &[
                    gst::MessageType::Eos,
                    gst::MessageType::Error,
                    gst::MessageType::Warning,
                    gst::MessageType::StateChanged,
                    gst::MessageType::Element,
                ],
            ) else {
                continue;
            };

            match msg.view() {
                gst::MessageView::Eos(..) => return Ok(true),
                gst::MessageView::Error(err) => return Err(Error::from_error_message(err)),
                gst::MessageView::Warning(warning) => {
                    gst::warning!(
                        CAT,
                        obj = &self.pipeline,
                        "Warning from {:?}: {} ({:?})",
                        warning.src().map(|s| s.path_string()),
                        warning.error(),
                        warning.debug()
                    );
                }
                gst::MessageView::StateChanged(state) => {
                    if state.src() == Some(self.pipeline.upcast_ref::<gst::Object>()) {
                        gst::debug!(
                            CAT,
                            obj = &self.pipeline,
                            "Pipeline state changed from {:?} to {:?}",
                            state.old(),
                            state.current()
                        );
                    }
                }
                gst::MessageView::Element(element) => {
                    if element
                        .structure()
                        .map(|s| s.has_name(FINISHED_MESSAGE))
                        .unwrap_or(false)
                    {
                        return Ok(false);
                    }
                }
                _ => (),
            }
        }
    }
}

impl Drop for DecoderPipeline {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = DecoderSettings::default();
        assert_eq!(settings.format, gst_video::VideoFormat::Rgba);
        assert_eq!(settings.width, None);
        assert_eq!(settings.height, None);
        assert!(!settings.sync);
        assert_eq!(settings.max_frames, 0);
        assert_eq!(settings.timeout, None);
    }

    #[test]
    fn test_source_from_location() {
        assert!(matches!(
            Source::from_location("file:///tmp/video.mkv"),
            Source::Uri(ref uri) if uri == "file:///tmp/video.mkv"
        ));
        assert!(matches!(
            Source::from_location("https://example.com/clip.webm"),
            Source::Uri(_)
        ));
        assert!(matches!(
            Source::from_location("/tmp/video.mkv"),
            Source::File(ref path) if path == &PathBuf::from("/tmp/video.mkv")
        ));
        assert!(matches!(
            Source::from_location("clips/video.mkv"),
            Source::File(_)
        ));
    }
}
