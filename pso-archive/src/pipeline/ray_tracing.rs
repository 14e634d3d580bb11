// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Ray tracing pipeline description and shader groups.
//!
//! A ray tracing pipeline owns a pool of shaders shared by its groups. Group
//! members refer to pool slots by index; the archive stores those indices in
//! the device-independent data and a per-backend table mapping each pool slot
//! to a shader list entry in the device data.

use crate::SHADER_UNUSED;

/// A ray generation, miss or callable shader group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RayTracingGeneralShaderGroup {
    pub name: String,
    pub shader_index: u32,
}

impl Default for RayTracingGeneralShaderGroup {
    fn default() -> Self {
        Self {
            name: String::new(),
            shader_index: SHADER_UNUSED,
        }
    }
}

/// A hit group for triangle geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RayTracingTriangleHitShaderGroup {
    pub name: String,
    pub closest_hit_shader_index: u32,
    pub any_hit_shader_index: u32,
}

impl Default for RayTracingTriangleHitShaderGroup {
    fn default() -> Self {
        Self {
            name: String::new(),
            closest_hit_shader_index: SHADER_UNUSED,
            any_hit_shader_index: SHADER_UNUSED,
        }
    }
}

/// A hit group for procedural geometry with a custom intersection shader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RayTracingProceduralHitShaderGroup {
    pub name: String,
    pub intersection_shader_index: u32,
    pub closest_hit_shader_index: u32,
    pub any_hit_shader_index: u32,
}

impl Default for RayTracingProceduralHitShaderGroup {
    fn default() -> Self {
        Self {
            name: String::new(),
            intersection_shader_index: SHADER_UNUSED,
            closest_hit_shader_index: SHADER_UNUSED,
            any_hit_shader_index: SHADER_UNUSED,
        }
    }
}

/// Description of a ray tracing pipeline.
///
/// Shader indices refer to the pipeline's shader pool in creation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RayTracingPipelineDesc {
    pub shader_record_size: u16,
    pub max_recursion_depth: u8,
    pub shader_record_name: Option<String>,
    pub max_attribute_size: u32,
    pub max_payload_size: u32,
    pub general_shaders: Vec<RayTracingGeneralShaderGroup>,
    pub triangle_hit_shaders: Vec<RayTracingTriangleHitShaderGroup>,
    pub procedural_hit_shaders: Vec<RayTracingProceduralHitShaderGroup>,
}

impl RayTracingPipelineDesc {
    /// Iterates over every shader pool index referenced by any group,
    /// including [`SHADER_UNUSED`] entries.
    pub fn shader_indices(&self) -> impl Iterator<Item = u32> + '_ {
        let general = self.general_shaders.iter().map(|g| g.shader_index);
        let triangle = self
            .triangle_hit_shaders
            .iter()
            .flat_map(|g| [g.closest_hit_shader_index, g.any_hit_shader_index]);
        let procedural = self.procedural_hit_shaders.iter().flat_map(|g| {
            [
                g.intersection_shader_index,
                g.closest_hit_shader_index,
                g.any_hit_shader_index,
            ]
        });

        general.chain(triangle).chain(procedural)
    }
}
