// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The slice of video configuration the pool cares about.

use crate::BufferError;
use std::fmt;
use std::str::FromStr;

/// Video codecs a platform may publish a buffer budget for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// No video stream is known yet.
    #[default]
    None,
    H264,
    H265,
    Mpeg2,
    Theora,
    Vc1,
    Av1,
    Vp8,
    Vp9,
}

impl VideoCodec {
    /// All codecs, `None` first.
    pub const ALL: [VideoCodec; 9] = [
        VideoCodec::None,
        VideoCodec::H264,
        VideoCodec::H265,
        VideoCodec::Mpeg2,
        VideoCodec::Theora,
        VideoCodec::Vc1,
        VideoCodec::Av1,
        VideoCodec::Vp8,
        VideoCodec::Vp9,
    ];

    /// Lowercase name as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::None => "none",
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
            VideoCodec::Mpeg2 => "mpeg2",
            VideoCodec::Theora => "theora",
            VideoCodec::Vc1 => "vc1",
            VideoCodec::Av1 => "av1",
            VideoCodec::Vp8 => "vp8",
            VideoCodec::Vp9 => "vp9",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VideoCodec {
    type Err = BufferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let alias = match lower.as_str() {
            "avc" => "h264",
            "hevc" => "h265",
            other => other,
        };
        VideoCodec::ALL
            .into_iter()
            .find(|c| c.name() == alias)
            .ok_or_else(|| BufferError::ConfigError(format!("unknown video codec '{s}'")))
    }
}

/// Codec, visible resolution and bit depth of the active video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VideoConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
}

impl VideoConfig {
    pub fn new(codec: VideoCodec, width: u32, height: u32, bits_per_pixel: u32) -> Self {
        Self {
            codec,
            width,
            height,
            bits_per_pixel,
        }
    }

    /// Returns true once a real codec has been configured.
    pub fn is_known(&self) -> bool {
        self.codec != VideoCodec::None
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self::new(VideoCodec::None, 0, 0, 8)
    }
}

impl fmt::Display for VideoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{} @ {} bpp",
            self.codec, self.width, self.height, self.bits_per_pixel
        )
    }
}
