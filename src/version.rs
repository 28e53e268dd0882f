// Copyright (C) 2025, Rafael Caricio <rafael@caricio.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::fmt;

/// Release maturity of a GStreamer build, encoded in the nano version field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maturity {
    /// nano == 1, a development snapshot
    Cvs,
    /// nano == 2
    Prerelease,
    Release,
}

impl Maturity {
    pub fn from_nano(nano: u32) -> Self {
        match nano {
            1 => Maturity::Cvs,
            2 => Maturity::Prerelease,
            _ => Maturity::Release,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Maturity::Cvs => "(CVS)",
            Maturity::Prerelease => "(Prerelease)",
            Maturity::Release => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub nano: u32,
}

impl Version {
    /// Version of the GStreamer library linked at runtime.
    pub fn runtime() -> Self {
        let (major, minor, micro, nano) = gst::version();
        Version {
            major,
            minor,
            micro,
            nano,
        }
    }

    pub fn maturity(&self) -> Maturity {
        Maturity::from_nano(self.nano)
    }

    /// The diagnostic line printed at startup, without the trailing newline.
    ///
    /// The separator before the maturity tag is always present, so release
    /// builds end with a single space.
    pub fn banner(&self) -> String {
        format!(
            "This program is linked against GStreamer {}.{}.{} {}",
            self.major,
            self.minor,
            self.micro,
            self.maturity().tag()
        )
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        match self.maturity() {
            Maturity::Release => Ok(()),
            maturity => write!(f, " {}", maturity.tag()),
        }
    }
}
