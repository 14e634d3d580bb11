// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Tile pipeline description.

use crate::{format::TextureFormat, MAX_RENDER_TARGETS};

/// Description of a tile pipeline (Metal tile shading).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TilePipelineDesc {
    pub num_render_targets: u8,
    pub sample_count: u8,
    pub rtv_formats: [TextureFormat; MAX_RENDER_TARGETS],
}

impl Default for TilePipelineDesc {
    fn default() -> Self {
        Self {
            num_render_targets: 0,
            sample_count: 1,
            rtv_formats: [TextureFormat::Unknown; MAX_RENDER_TARGETS],
        }
    }
}
