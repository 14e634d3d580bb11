// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Pipeline state descriptions and archiver inputs.
//!
//! The persisted model of a pipeline is [`PipelineStateData`]: the fields
//! shared by every pipeline kind plus a kind-specific description. The
//! `*CreateInfo` types are the write-side inputs; they additionally carry the
//! shaders to compile and, where applicable, inline signature and render pass
//! descriptions that the archiver stores as separate named resources.

use crate::{
    render_pass::RenderPassDesc,
    shader::{ShaderCreateInfo, ShaderStages},
    signature::{ImmutableSamplerDesc, ResourceSignatureDesc, ResourceVariableType},
    MAX_SHADERS_IN_PIPELINE,
};

pub mod graphics;
pub mod ray_tracing;
pub mod tile;

pub use graphics::GraphicsPipelineDesc;
pub use ray_tracing::RayTracingPipelineDesc;
pub use tile::TilePipelineDesc;

wire_enum! {
    /// Kind of a pipeline state object.
    pub enum PipelineType {
        Graphics = 0,
        Compute = 1,
        Mesh = 2,
        RayTracing = 3,
        Tile = 4,
    }
}

impl PipelineType {
    /// Stage-to-slot mapping for pipelines of this type.
    ///
    /// Each slot lists the stages that map to it; unused slots are empty.
    /// The mapping is part of the archived signature internal data and must
    /// not change.
    pub const fn stage_slots(self) -> &'static [ShaderStages; MAX_SHADERS_IN_PIPELINE] {
        const EMPTY: ShaderStages = ShaderStages::empty();

        match self {
            PipelineType::Graphics => &[
                ShaderStages::VERTEX,
                ShaderStages::PIXEL,
                ShaderStages::GEOMETRY,
                ShaderStages::HULL,
                ShaderStages::DOMAIN,
                EMPTY,
            ],
            PipelineType::Mesh => &[
                ShaderStages::AMPLIFICATION,
                ShaderStages::MESH,
                ShaderStages::PIXEL,
                EMPTY,
                EMPTY,
                EMPTY,
            ],
            PipelineType::Compute => &[
                ShaderStages::COMPUTE,
                EMPTY,
                EMPTY,
                EMPTY,
                EMPTY,
                EMPTY,
            ],
            PipelineType::RayTracing => &[
                ShaderStages::RAY_GEN,
                ShaderStages::RAY_MISS,
                ShaderStages::RAY_CLOSEST_HIT,
                ShaderStages::RAY_ANY_HIT,
                ShaderStages::RAY_INTERSECTION,
                ShaderStages::CALLABLE,
            ],
            PipelineType::Tile => &[
                ShaderStages::TILE,
                EMPTY,
                EMPTY,
                EMPTY,
                EMPTY,
                EMPTY,
            ],
        }
    }

    /// Slot a single-stage shader occupies in pipelines of this type.
    pub fn slot_for_stage(self, stage: ShaderStages) -> Option<usize> {
        self.stage_slots()
            .iter()
            .position(|slot| slot.intersects(stage))
    }
}

wire_flags! {
    /// Pipeline creation options.
    pub struct PipelineStateFlags {
        const IGNORE_MISSING_VARIABLES = 1 << 0;
        const IGNORE_MISSING_IMMUTABLE_SAMPLERS = 1 << 1;
        const DONT_REMAP_SHADER_RESOURCES = 1 << 2;
    }
}

wire_flags! {
    /// Per-variable options in a resource layout.
    pub struct ShaderVariableFlags {
        const NO_DYNAMIC_BUFFERS = 1 << 0;
        const GENERAL_INPUT_ATTACHMENT = 1 << 1;
    }
}

/// Explicit variable type override in a resource layout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderResourceVariableDesc {
    pub name: String,
    pub shader_stages: ShaderStages,
    pub var_type: ResourceVariableType,
    pub flags: ShaderVariableFlags,
}

/// Resource layout used when a pipeline declares no explicit signatures.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineResourceLayoutDesc {
    pub default_variable_type: ResourceVariableType,
    pub default_variable_merge_stages: ShaderStages,
    pub variables: Vec<ShaderResourceVariableDesc>,
    pub immutable_samplers: Vec<ImmutableSamplerDesc>,
}

/// Fields shared by every archived pipeline kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineBaseData {
    /// Archive resource name. Stored in the chunk index, not in the payload.
    pub name: String,
    pub pipeline_type: PipelineType,
    pub flags: PipelineStateFlags,
    pub resource_layout: PipelineResourceLayoutDesc,
    /// Names of the signatures this pipeline binds, in binding order.
    /// Contains the synthesized default signature name when the pipeline was
    /// archived without explicit signatures.
    pub signature_names: Vec<String>,
}

/// The persisted model of one pipeline: shared fields plus the kind-specific
/// description.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineStateData<T> {
    pub base: PipelineBaseData,
    pub desc: T,
}

/// Archiver input for a graphics or mesh pipeline.
#[derive(Clone, Debug, Default)]
pub struct GraphicsPipelineCreateInfo {
    pub name: String,
    pub flags: PipelineStateFlags,
    pub resource_layout: PipelineResourceLayoutDesc,
    /// Explicit signatures; empty to let each backend reflect a default one.
    pub signatures: Vec<ResourceSignatureDesc>,
    pub graphics: GraphicsPipelineDesc,
    /// Stored as a named render pass resource and referenced by name.
    pub render_pass: Option<RenderPassDesc>,
    /// One shader per active stage; stages must be distinct.
    pub shaders: Vec<ShaderCreateInfo>,
}

/// Archiver input for a compute pipeline.
#[derive(Clone, Debug, Default)]
pub struct ComputePipelineCreateInfo {
    pub name: String,
    pub flags: PipelineStateFlags,
    pub resource_layout: PipelineResourceLayoutDesc,
    pub signatures: Vec<ResourceSignatureDesc>,
    pub shader: ShaderCreateInfo,
}

/// Archiver input for a tile pipeline.
#[derive(Clone, Debug, Default)]
pub struct TilePipelineCreateInfo {
    pub name: String,
    pub flags: PipelineStateFlags,
    pub resource_layout: PipelineResourceLayoutDesc,
    pub signatures: Vec<ResourceSignatureDesc>,
    pub tile: TilePipelineDesc,
    pub shader: ShaderCreateInfo,
}

/// Archiver input for a ray tracing pipeline.
///
/// Shader group indices in `ray_tracing` refer to positions in `shaders`,
/// with [`SHADER_UNUSED`](crate::SHADER_UNUSED) for absent group members.
#[derive(Clone, Debug, Default)]
pub struct RayTracingPipelineCreateInfo {
    pub name: String,
    pub flags: PipelineStateFlags,
    pub resource_layout: PipelineResourceLayoutDesc,
    pub signatures: Vec<ResourceSignatureDesc>,
    pub ray_tracing: RayTracingPipelineDesc,
    pub shaders: Vec<ShaderCreateInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphics_stage_slots() {
        let ty = PipelineType::Graphics;
        assert_eq!(ty.slot_for_stage(ShaderStages::VERTEX), Some(0));
        assert_eq!(ty.slot_for_stage(ShaderStages::PIXEL), Some(1));
        assert_eq!(ty.slot_for_stage(ShaderStages::COMPUTE), None);
    }

    #[test]
    fn ray_tracing_stage_slots_cover_all_six() {
        let ty = PipelineType::RayTracing;
        assert_eq!(ty.slot_for_stage(ShaderStages::RAY_GEN), Some(0));
        assert_eq!(ty.slot_for_stage(ShaderStages::CALLABLE), Some(5));
    }
}
