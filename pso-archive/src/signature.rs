// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Resource signature descriptions.
//!
//! A resource signature defines the shader-visible resource layout a set of
//! pipelines binds against. Signatures are archived once under their name and
//! referenced by name from pipeline descriptions.

use crate::{pipeline::PipelineType, shader::ShaderStages, MAX_SHADERS_IN_PIPELINE};

wire_enum! {
    /// Kind of a shader-visible resource.
    pub enum ShaderResourceType {
        Unknown = 0,
        ConstantBuffer = 1,
        TextureSrv = 2,
        BufferSrv = 3,
        TextureUav = 4,
        BufferUav = 5,
        Sampler = 6,
        InputAttachment = 7,
        AccelerationStructure = 8,
    }
}

wire_enum! {
    /// How often a resource binding is expected to change.
    pub enum ResourceVariableType {
        Static = 0,
        Mutable = 1,
        Dynamic = 2,
    }
}

wire_flags! {
    /// Per-resource binding options.
    pub struct PipelineResourceFlags {
        const NO_DYNAMIC_BUFFERS = 1 << 0;
        const COMBINED_SAMPLER = 1 << 1;
        const FORMATTED_BUFFER = 1 << 2;
        const RUNTIME_ARRAY = 1 << 3;
    }
}

wire_enum! {
    /// Texture sampling filter.
    pub enum FilterType {
        Unknown = 0,
        Point = 1,
        Linear = 2,
        Anisotropic = 3,
        ComparisonPoint = 4,
        ComparisonLinear = 5,
        ComparisonAnisotropic = 6,
    }
}

wire_enum! {
    /// Texture coordinate wrapping outside [0, 1).
    pub enum TextureAddressMode {
        Unknown = 0,
        Wrap = 1,
        Mirror = 2,
        Clamp = 3,
        Border = 4,
        MirrorOnce = 5,
    }
}

wire_enum! {
    /// Comparison operator for depth tests and comparison samplers.
    pub enum ComparisonFunction {
        Unknown = 0,
        Never = 1,
        Less = 2,
        Equal = 3,
        LessEqual = 4,
        Greater = 5,
        NotEqual = 6,
        GreaterEqual = 7,
        Always = 8,
    }
}

wire_flags! {
    /// Sampler creation options.
    pub struct SamplerFlags {
        const SUBSAMPLED = 1 << 0;
        const SUBSAMPLED_COARSE_RECONSTRUCTION = 1 << 1;
    }
}

/// Full description of a texture sampler.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplerDesc {
    pub name: String,
    pub min_filter: FilterType,
    pub mag_filter: FilterType,
    pub mip_filter: FilterType,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub flags: SamplerFlags,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: ComparisonFunction,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            min_filter: FilterType::Linear,
            mag_filter: FilterType::Linear,
            mip_filter: FilterType::Linear,
            address_u: TextureAddressMode::Clamp,
            address_v: TextureAddressMode::Clamp,
            address_w: TextureAddressMode::Clamp,
            flags: SamplerFlags::empty(),
            mip_lod_bias: 0.0,
            max_anisotropy: 0,
            comparison_func: ComparisonFunction::Never,
            border_color: [0.0; 4],
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

/// A sampler baked into a signature and bound to a texture or sampler name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImmutableSamplerDesc {
    /// Texture name when combined samplers are used, sampler name otherwise.
    pub sampler_or_texture_name: String,
    pub shader_stages: ShaderStages,
    pub desc: SamplerDesc,
}

/// One resource slot of a signature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceDesc {
    pub name: String,
    pub shader_stages: ShaderStages,
    pub array_size: u32,
    pub resource_type: ShaderResourceType,
    pub var_type: ResourceVariableType,
    pub flags: PipelineResourceFlags,
}

/// Description of a pipeline resource signature.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSignatureDesc {
    pub name: String,
    /// Index of the descriptor-set-like binding slot this signature occupies,
    /// below [`MAX_RESOURCE_SIGNATURES`](crate::MAX_RESOURCE_SIGNATURES).
    pub binding_index: u8,
    pub use_combined_texture_samplers: bool,
    pub combined_sampler_suffix: String,
    pub resources: Vec<ResourceDesc>,
    pub immutable_samplers: Vec<ImmutableSamplerDesc>,
}

impl Default for ResourceSignatureDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            binding_index: 0,
            use_combined_texture_samplers: false,
            combined_sampler_suffix: "_sampler".to_owned(),
            resources: Vec::new(),
            immutable_samplers: Vec::new(),
        }
    }
}

/// Derived signature state persisted next to the description.
///
/// Stage visibility summaries and the per-stage index of static resources;
/// recomputing these at load time would require full reflection, so they are
/// archived with the desc.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureInternalData {
    pub shader_stages: ShaderStages,
    pub static_res_shader_stages: ShaderStages,
    pub pipeline_type: PipelineType,
    /// For each pipeline shader slot, the index of its static resource cache,
    /// or -1 when the stage has no static resources.
    pub static_res_stage_index: [i8; MAX_SHADERS_IN_PIPELINE],
}

impl Default for SignatureInternalData {
    fn default() -> Self {
        Self {
            shader_stages: ShaderStages::empty(),
            static_res_shader_stages: ShaderStages::empty(),
            pipeline_type: PipelineType::Graphics,
            static_res_stage_index: [-1; MAX_SHADERS_IN_PIPELINE],
        }
    }
}

impl SignatureInternalData {
    /// Computes the internal data for a signature used with pipelines of the
    /// given type.
    pub fn for_desc(desc: &ResourceSignatureDesc, pipeline_type: PipelineType) -> Self {
        let mut shader_stages = ShaderStages::empty();
        let mut static_res_shader_stages = ShaderStages::empty();

        for resource in &desc.resources {
            shader_stages |= resource.shader_stages;

            if resource.var_type == ResourceVariableType::Static {
                static_res_shader_stages |= resource.shader_stages;
            }
        }

        let mut static_res_stage_index = [-1i8; MAX_SHADERS_IN_PIPELINE];
        let mut cache_index = 0i8;

        for (slot, stage) in pipeline_type.stage_slots().iter().enumerate() {
            if static_res_shader_stages.intersects(*stage) {
                static_res_stage_index[slot] = cache_index;
                cache_index += 1;
            }
        }

        Self {
            shader_stages,
            static_res_shader_stages,
            pipeline_type,
            static_res_stage_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_data_assigns_static_stage_indices() {
        let desc = ResourceSignatureDesc {
            name: "Sig".to_owned(),
            resources: vec![
                ResourceDesc {
                    name: "Constants".to_owned(),
                    shader_stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
                    array_size: 1,
                    resource_type: ShaderResourceType::ConstantBuffer,
                    var_type: ResourceVariableType::Static,
                    flags: PipelineResourceFlags::empty(),
                },
                ResourceDesc {
                    name: "Texture".to_owned(),
                    shader_stages: ShaderStages::PIXEL,
                    array_size: 1,
                    resource_type: ShaderResourceType::TextureSrv,
                    var_type: ResourceVariableType::Mutable,
                    flags: PipelineResourceFlags::empty(),
                },
            ],
            ..Default::default()
        };

        let internal = SignatureInternalData::for_desc(&desc, PipelineType::Graphics);

        assert_eq!(
            internal.shader_stages,
            ShaderStages::VERTEX | ShaderStages::PIXEL
        );
        assert_eq!(
            internal.static_res_shader_stages,
            ShaderStages::VERTEX | ShaderStages::PIXEL
        );
        // Graphics slots: vertex = 0, pixel = 1, rest unused.
        assert_eq!(internal.static_res_stage_index[0], 0);
        assert_eq!(internal.static_res_stage_index[1], 1);
        assert_eq!(&internal.static_res_stage_index[2..], [-1, -1, -1, -1]);
    }
}
