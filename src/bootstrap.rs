// Copyright (C) 2025, Rafael Caricio <rafael@caricio.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Process-wide GStreamer setup.
//!
//! [`initialize`] must run before any pipeline is built. It hands back an
//! [`Initialized`] token which the pipeline builder requires, so skipping the
//! setup step does not compile.

use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::PathBuf;

use once_cell::sync::{Lazy, OnceCell};

use crate::error::Error;
use crate::framesink;
use crate::version::Version;

static CAT: Lazy<gst::DebugCategory> = Lazy::new(|| {
    gst::DebugCategory::new(
        "frameextractor",
        gst::DebugColorFlags::empty(),
        Some("Frame extractor setup"),
    )
});

static INITIALIZED: OnceCell<Version> = OnceCell::new();

/// Proof that GStreamer was initialized in this process.
#[derive(Debug, Clone, Copy)]
pub struct Initialized {
    version: Version,
}

impl Initialized {
    /// Runtime GStreamer version queried during setup.
    pub fn version(&self) -> Version {
        self.version
    }
}

/// GStreamer's own command line options.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GstOptions {
    /// `--gst-debug`, a `GST_DEBUG` style threshold list
    pub debug: Option<String>,
    /// `--gst-debug-level`, 0 (none) to 9 (memdump)
    pub debug_level: Option<u8>,
    /// `--gst-debug-disable`
    pub debug_disabled: bool,
    /// `--gst-plugin-path`
    pub plugin_paths: Vec<PathBuf>,
}

const DEBUG: &str = "--gst-debug";
const DEBUG_LEVEL: &str = "--gst-debug-level";
const DEBUG_DISABLE: &str = "--gst-debug-disable";
const PLUGIN_PATH: &str = "--gst-plugin-path";

impl GstOptions {
    /// Splits recognized GStreamer options out of `args`.
    ///
    /// The remaining arguments keep their order, the program name included.
    /// Nothing after a `--` separator is treated as a GStreamer option.
    pub fn strip<I, T>(args: I) -> Result<(GstOptions, Vec<OsString>), Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut options = GstOptions::default();
        let mut remaining = Vec::new();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            let Some(text) = arg.to_str() else {
                remaining.push(arg);
                continue;
            };

            if text == "--" {
                remaining.push(arg);
                remaining.extend(args.by_ref());
                break;
            }

            if text == DEBUG_DISABLE {
                options.debug_disabled = true;
                continue;
            }

            let (name, inline_value) = match text.split_once('=') {
                Some((name, value)) => (name, Some(value.to_owned())),
                None => (text, None),
            };

            if ![DEBUG, DEBUG_LEVEL, PLUGIN_PATH].contains(&name) {
                remaining.push(arg);
                continue;
            }

            let name = name.to_owned();
            let value = match inline_value {
                Some(value) => value,
                None => args
                    .next()
                    .and_then(|value| value.into_string().ok())
                    .ok_or_else(|| Error::MissingOptionValue(name.clone()))?,
            };

            match name.as_str() {
                DEBUG => options.debug = Some(value),
                DEBUG_LEVEL => options.debug_level = Some(parse_debug_level(&name, &value)?),
                PLUGIN_PATH => options
                    .plugin_paths
                    .extend(std::env::split_paths(OsStr::new(&value))),
                _ => unreachable!(),
            }
        }

        Ok((options, remaining))
    }

    /// Applies the options to the running GStreamer instance.
    fn apply(&self) {
        if let Some(level) = self.debug_level {
            gst::log::set_default_threshold(debug_level(level));
        }

        if let Some(ref spec) = self.debug {
            gst::log::set_threshold_from_string(spec, false);
        }

        if self.debug_disabled {
            gst::log::set_active(false);
        }

        if !self.plugin_paths.is_empty() {
            let registry = gst::Registry::get();
            for path in &self.plugin_paths {
                let changed = registry.scan_path(path);
                gst::debug!(
                    CAT,
                    "Scanned plugin path {} (registry changed: {})",
                    path.display(),
                    changed
                );
            }
        }
    }
}

fn parse_debug_level(option: &str, value: &str) -> Result<u8, Error> {
    match value.parse::<u8>() {
        Ok(level) if level <= 9 => Ok(level),
        _ => Err(Error::InvalidOption {
            option: option.to_owned(),
            value: value.to_owned(),
        }),
    }
}

fn debug_level(level: u8) -> gst::DebugLevel {
    match level {
        0 => gst::DebugLevel::None,
        1 => gst::DebugLevel::Error,
        2 => gst::DebugLevel::Warning,
        3 => gst::DebugLevel::Fixme,
        4 => gst::DebugLevel::Info,
        5 => gst::DebugLevel::Debug,
        6 => gst::DebugLevel::Log,
        7 | 8 => gst::DebugLevel::Trace,
        _ => gst::DebugLevel::Memdump,
    }
}

/// Initializes GStreamer from the process arguments.
///
/// GStreamer options are stripped and applied, everything else is returned
/// for the application's own argument parser. The first call in the process
/// writes the version banner line to `out`. Later calls reuse the existing
/// setup and write nothing.
pub fn initialize<I, T, W>(args: I, out: &mut W) -> Result<(Initialized, Vec<OsString>), Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
    W: Write,
{
    let (options, remaining) = GstOptions::strip(args)?;

    let mut first_call = false;
    let version = *INITIALIZED.get_or_try_init(|| {
        gst::init().map_err(Error::Init)?;
        framesink::register_element().map_err(|error| Error::ElementCreation {
            factory: "framesink",
            error,
        })?;
        first_call = true;
        Ok::<_, Error>(Version::runtime())
    })?;

    options.apply();

    if first_call {
        writeln!(out, "{}", version.banner())?;
        out.flush()?;
        gst::info!(CAT, "Initialized GStreamer {}", version);
    } else {
        gst::debug!(CAT, "GStreamer already initialized");
    }

    Ok((Initialized { version }, remaining))
}

/// [`initialize`] with the process arguments and standard output.
pub fn initialize_from_env() -> Result<(Initialized, Vec<OsString>), Error> {
    initialize(std::env::args_os(), &mut std::io::stdout().lock())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(args: &[&str]) -> (GstOptions, Vec<OsString>) {
        GstOptions::strip(args.iter().copied()).unwrap()
    }

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_no_gst_options() {
        let (options, rest) = strip(&["prog", "video.mkv", "--max-frames", "3"]);
        assert_eq!(options, GstOptions::default());
        assert_eq!(rest, os(&["prog", "video.mkv", "--max-frames", "3"]));
    }

    #[test]
    fn test_strips_inline_values() {
        let (options, rest) = strip(&[
            "prog",
            "--gst-debug=framesink:5",
            "video.mkv",
            "--gst-debug-level=2",
        ]);
        assert_eq!(options.debug.as_deref(), Some("framesink:5"));
        assert_eq!(options.debug_level, Some(2));
        assert_eq!(rest, os(&["prog", "video.mkv"]));
    }

    #[test]
    fn test_strips_separate_values() {
        let (options, rest) = strip(&["prog", "--gst-debug", "*:3", "--gst-debug-disable", "in.mp4"]);
        assert_eq!(options.debug.as_deref(), Some("*:3"));
        assert!(options.debug_disabled);
        assert_eq!(rest, os(&["prog", "in.mp4"]));
    }

    #[test]
    fn test_plugin_paths_are_split() {
        let joined = std::env::join_paths(["/opt/a", "/opt/b"]).unwrap();
        let arg = format!("--gst-plugin-path={}", joined.to_str().unwrap());
        let (options, rest) = strip(&["prog", &arg]);
        assert_eq!(
            options.plugin_paths,
            vec![PathBuf::from("/opt/a"), PathBuf::from("/opt/b")]
        );
        assert_eq!(rest, os(&["prog"]));
    }

    #[test]
    fn test_separator_stops_stripping() {
        let (options, rest) = strip(&["prog", "--", "--gst-debug=*:9"]);
        assert_eq!(options.debug, None);
        assert_eq!(rest, os(&["prog", "--", "--gst-debug=*:9"]));
    }

    #[test]
    fn test_similar_names_are_kept() {
        let (options, rest) = strip(&["prog", "--gst-debugger", "--gst-debug-levels=3"]);
        assert_eq!(options, GstOptions::default());
        assert_eq!(rest, os(&["prog", "--gst-debugger", "--gst-debug-levels=3"]));
    }

    #[test]
    fn test_invalid_debug_level() {
        let err = GstOptions::strip(["prog", "--gst-debug-level=loud"]).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { ref value, .. } if value == "loud"));

        let err = GstOptions::strip(["prog", "--gst-debug-level=10"]).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
    }

    #[test]
    fn test_missing_value() {
        let err = GstOptions::strip(["prog", "--gst-debug"]).unwrap_err();
        assert!(matches!(err, Error::MissingOptionValue(ref name) if name == DEBUG));
    }

    #[test]
    fn test_debug_level_mapping() {
        assert_eq!(debug_level(0), gst::DebugLevel::None);
        assert_eq!(debug_level(2), gst::DebugLevel::Warning);
        assert_eq!(debug_level(7), gst::DebugLevel::Trace);
        assert_eq!(debug_level(9), gst::DebugLevel::Memdump);
    }
}
