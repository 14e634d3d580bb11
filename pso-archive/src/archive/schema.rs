// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Serialization schemas for every archived payload.
//!
//! Each function here runs under all three serializer modes. Field order is
//! the wire format; reordering or resizing any field is a format break and
//! requires bumping [`ARCHIVE_VERSION`](super::ARCHIVE_VERSION).

use crate::{
    pipeline::{
        graphics::{GraphicsPipelineDesc, RenderTargetBlendDesc},
        ray_tracing::{
            RayTracingGeneralShaderGroup, RayTracingPipelineDesc,
            RayTracingProceduralHitShaderGroup, RayTracingTriangleHitShaderGroup,
        },
        tile::TilePipelineDesc,
        PipelineBaseData, PipelineResourceLayoutDesc, ShaderResourceVariableDesc,
    },
    render_pass::{
        AttachmentReference, RenderPassAttachmentDesc, RenderPassDesc, ShadingRateAttachment,
        SubpassDependencyDesc, SubpassDesc,
    },
    serializer::{SerializeError, Serializer, SerializerMode},
    shader::CompiledShader,
    signature::{
        ImmutableSamplerDesc, ResourceDesc, ResourceSignatureDesc, SamplerDesc,
        SignatureInternalData,
    },
};

use super::reader::ArchiveDebugInfo;

/// Serializes an `Option<T>` as a `u32` presence flag followed by the value.
fn option<S: Serializer, T: Default>(
    ser: &mut S,
    value: &mut Option<T>,
    mut each: impl FnMut(&mut S, &mut T) -> Result<(), SerializeError>,
) -> Result<(), SerializeError> {
    let mut present = u32::from(value.is_some());
    ser.pod(&mut present)?;

    if S::MODE == SerializerMode::Read {
        *value = (present != 0).then(T::default);
    }

    if let Some(inner) = value.as_mut() {
        each(ser, inner)?;
    }

    Ok(())
}

pub(crate) fn sampler_desc<S: Serializer>(
    ser: &mut S,
    desc: &mut SamplerDesc,
) -> Result<(), SerializeError> {
    ser.string(&mut desc.name)?;
    ser.wire_enum(&mut desc.min_filter)?;
    ser.wire_enum(&mut desc.mag_filter)?;
    ser.wire_enum(&mut desc.mip_filter)?;
    ser.wire_enum(&mut desc.address_u)?;
    ser.wire_enum(&mut desc.address_v)?;
    ser.wire_enum(&mut desc.address_w)?;
    ser.wire_enum(&mut desc.flags)?;
    ser.pod(&mut desc.mip_lod_bias)?;
    ser.pod(&mut desc.max_anisotropy)?;
    ser.wire_enum(&mut desc.comparison_func)?;
    ser.pod(&mut desc.border_color)?;
    ser.pod(&mut desc.min_lod)?;
    ser.pod(&mut desc.max_lod)
}

fn immutable_sampler<S: Serializer>(
    ser: &mut S,
    sampler: &mut ImmutableSamplerDesc,
) -> Result<(), SerializeError> {
    ser.string(&mut sampler.sampler_or_texture_name)?;
    ser.wire_enum(&mut sampler.shader_stages)?;
    sampler_desc(ser, &mut sampler.desc)
}

fn resource_desc<S: Serializer>(
    ser: &mut S,
    resource: &mut ResourceDesc,
) -> Result<(), SerializeError> {
    ser.string(&mut resource.name)?;
    ser.wire_enum(&mut resource.shader_stages)?;
    ser.pod(&mut resource.array_size)?;
    ser.wire_enum(&mut resource.resource_type)?;
    ser.wire_enum(&mut resource.var_type)?;
    ser.wire_enum(&mut resource.flags)
}

/// Common data payload of a resource signature. The name lives in the chunk
/// index and is not part of the payload.
pub(crate) fn signature<S: Serializer>(
    ser: &mut S,
    desc: &mut ResourceSignatureDesc,
    internal: &mut SignatureInternalData,
) -> Result<(), SerializeError> {
    ser.pod(&mut desc.binding_index)?;
    ser.boolean(&mut desc.use_combined_texture_samplers)?;
    ser.string(&mut desc.combined_sampler_suffix)?;
    ser.slice(&mut desc.resources, resource_desc)?;
    ser.slice(&mut desc.immutable_samplers, immutable_sampler)?;

    ser.wire_enum(&mut internal.shader_stages)?;
    ser.wire_enum(&mut internal.static_res_shader_stages)?;
    ser.wire_enum(&mut internal.pipeline_type)?;
    ser.pod(&mut internal.static_res_stage_index)
}

fn resource_variable<S: Serializer>(
    ser: &mut S,
    variable: &mut ShaderResourceVariableDesc,
) -> Result<(), SerializeError> {
    ser.string(&mut variable.name)?;
    ser.wire_enum(&mut variable.shader_stages)?;
    ser.wire_enum(&mut variable.var_type)?;
    ser.wire_enum(&mut variable.flags)
}

fn resource_layout<S: Serializer>(
    ser: &mut S,
    layout: &mut PipelineResourceLayoutDesc,
) -> Result<(), SerializeError> {
    ser.wire_enum(&mut layout.default_variable_type)?;
    ser.wire_enum(&mut layout.default_variable_merge_stages)?;
    ser.slice(&mut layout.variables, resource_variable)?;
    ser.slice(&mut layout.immutable_samplers, immutable_sampler)
}

/// Fields shared by every pipeline kind, at the start of each pipeline's
/// common data payload.
pub(crate) fn pipeline_base<S: Serializer>(
    ser: &mut S,
    base: &mut PipelineBaseData,
) -> Result<(), SerializeError> {
    ser.wire_enum(&mut base.pipeline_type)?;
    ser.wire_enum(&mut base.flags)?;
    resource_layout(ser, &mut base.resource_layout)?;
    ser.slice(&mut base.signature_names, |ser, name| ser.string(name))
}

fn render_target_blend<S: Serializer>(
    ser: &mut S,
    blend: &mut RenderTargetBlendDesc,
) -> Result<(), SerializeError> {
    ser.boolean(&mut blend.blend_enable)?;
    ser.boolean(&mut blend.logic_operation_enable)?;
    ser.wire_enum(&mut blend.src_blend)?;
    ser.wire_enum(&mut blend.dest_blend)?;
    ser.wire_enum(&mut blend.blend_op)?;
    ser.wire_enum(&mut blend.src_blend_alpha)?;
    ser.wire_enum(&mut blend.dest_blend_alpha)?;
    ser.wire_enum(&mut blend.blend_op_alpha)?;
    ser.wire_enum(&mut blend.logic_op)?;
    ser.wire_enum(&mut blend.render_target_write_mask)
}

pub(crate) fn graphics_pipeline<S: Serializer>(
    ser: &mut S,
    desc: &mut GraphicsPipelineDesc,
) -> Result<(), SerializeError> {
    ser.boolean(&mut desc.blend.alpha_to_coverage_enable)?;
    ser.boolean(&mut desc.blend.independent_blend_enable)?;
    for blend in &mut desc.blend.render_targets {
        render_target_blend(ser, blend)?;
    }

    ser.pod(&mut desc.sample_mask)?;

    ser.wire_enum(&mut desc.rasterizer.fill_mode)?;
    ser.wire_enum(&mut desc.rasterizer.cull_mode)?;
    ser.boolean(&mut desc.rasterizer.front_counter_clockwise)?;
    ser.boolean(&mut desc.rasterizer.depth_clip_enable)?;
    ser.boolean(&mut desc.rasterizer.scissor_enable)?;
    ser.boolean(&mut desc.rasterizer.antialiased_line_enable)?;
    ser.pod(&mut desc.rasterizer.depth_bias)?;
    ser.pod(&mut desc.rasterizer.depth_bias_clamp)?;
    ser.pod(&mut desc.rasterizer.slope_scaled_depth_bias)?;

    ser.boolean(&mut desc.depth_stencil.depth_enable)?;
    ser.boolean(&mut desc.depth_stencil.depth_write_enable)?;
    ser.wire_enum(&mut desc.depth_stencil.depth_func)?;
    ser.boolean(&mut desc.depth_stencil.stencil_enable)?;
    ser.pod(&mut desc.depth_stencil.stencil_read_mask)?;
    ser.pod(&mut desc.depth_stencil.stencil_write_mask)?;
    for face in [
        &mut desc.depth_stencil.front_face,
        &mut desc.depth_stencil.back_face,
    ] {
        ser.wire_enum(&mut face.stencil_fail_op)?;
        ser.wire_enum(&mut face.stencil_depth_fail_op)?;
        ser.wire_enum(&mut face.stencil_pass_op)?;
        ser.wire_enum(&mut face.stencil_func)?;
    }

    ser.slice(&mut desc.input_layout, |ser, element| {
        ser.pod(&mut element.input_index)?;
        ser.pod(&mut element.buffer_slot)?;
        ser.pod(&mut element.num_components)?;
        ser.wire_enum(&mut element.value_type)?;
        ser.boolean(&mut element.is_normalized)?;
        ser.pod(&mut element.relative_offset)?;
        ser.pod(&mut element.stride)?;
        ser.wire_enum(&mut element.frequency)?;
        ser.pod(&mut element.instance_data_step_rate)
    })?;

    ser.wire_enum(&mut desc.primitive_topology)?;
    ser.pod(&mut desc.num_viewports)?;
    ser.pod(&mut desc.num_render_targets)?;
    ser.pod(&mut desc.subpass_index)?;
    ser.wire_enum(&mut desc.shading_rate_flags)?;
    for format in &mut desc.rtv_formats {
        ser.wire_enum(format)?;
    }
    ser.wire_enum(&mut desc.dsv_format)?;
    ser.pod(&mut desc.sample.count)?;
    ser.pod(&mut desc.sample.quality)?;
    ser.opt_string(&mut desc.render_pass_name)
}

pub(crate) fn tile_pipeline<S: Serializer>(
    ser: &mut S,
    desc: &mut TilePipelineDesc,
) -> Result<(), SerializeError> {
    ser.pod(&mut desc.num_render_targets)?;
    ser.pod(&mut desc.sample_count)?;
    for format in &mut desc.rtv_formats {
        ser.wire_enum(format)?;
    }

    Ok(())
}

fn general_group<S: Serializer>(
    ser: &mut S,
    group: &mut RayTracingGeneralShaderGroup,
) -> Result<(), SerializeError> {
    ser.string(&mut group.name)?;
    ser.pod(&mut group.shader_index)
}

fn triangle_hit_group<S: Serializer>(
    ser: &mut S,
    group: &mut RayTracingTriangleHitShaderGroup,
) -> Result<(), SerializeError> {
    ser.string(&mut group.name)?;
    ser.pod(&mut group.closest_hit_shader_index)?;
    ser.pod(&mut group.any_hit_shader_index)
}

fn procedural_hit_group<S: Serializer>(
    ser: &mut S,
    group: &mut RayTracingProceduralHitShaderGroup,
) -> Result<(), SerializeError> {
    ser.string(&mut group.name)?;
    ser.pod(&mut group.intersection_shader_index)?;
    ser.pod(&mut group.closest_hit_shader_index)?;
    ser.pod(&mut group.any_hit_shader_index)
}

pub(crate) fn ray_tracing_pipeline<S: Serializer>(
    ser: &mut S,
    desc: &mut RayTracingPipelineDesc,
) -> Result<(), SerializeError> {
    ser.pod(&mut desc.shader_record_size)?;
    ser.pod(&mut desc.max_recursion_depth)?;
    ser.opt_string(&mut desc.shader_record_name)?;
    ser.pod(&mut desc.max_attribute_size)?;
    ser.pod(&mut desc.max_payload_size)?;
    ser.slice(&mut desc.general_shaders, general_group)?;
    ser.slice(&mut desc.triangle_hit_shaders, triangle_hit_group)?;
    ser.slice(&mut desc.procedural_hit_shaders, procedural_hit_group)
}

fn attachment_reference<S: Serializer>(
    ser: &mut S,
    reference: &mut AttachmentReference,
) -> Result<(), SerializeError> {
    ser.pod(&mut reference.attachment_index)?;
    ser.wire_enum(&mut reference.state)
}

fn render_pass_attachment<S: Serializer>(
    ser: &mut S,
    attachment: &mut RenderPassAttachmentDesc,
) -> Result<(), SerializeError> {
    ser.wire_enum(&mut attachment.format)?;
    ser.pod(&mut attachment.sample_count)?;
    ser.wire_enum(&mut attachment.load_op)?;
    ser.wire_enum(&mut attachment.store_op)?;
    ser.wire_enum(&mut attachment.stencil_load_op)?;
    ser.wire_enum(&mut attachment.stencil_store_op)?;
    ser.wire_enum(&mut attachment.initial_state)?;
    ser.wire_enum(&mut attachment.final_state)
}

fn subpass<S: Serializer>(ser: &mut S, subpass: &mut SubpassDesc) -> Result<(), SerializeError> {
    ser.slice(&mut subpass.input_attachments, attachment_reference)?;
    ser.slice(&mut subpass.render_target_attachments, attachment_reference)?;
    ser.slice(&mut subpass.resolve_attachments, attachment_reference)?;
    option(ser, &mut subpass.depth_stencil_attachment, attachment_reference)?;
    ser.slice(&mut subpass.preserve_attachments, |ser, index| ser.pod(index))?;
    option(
        ser,
        &mut subpass.shading_rate_attachment,
        |ser, sra: &mut ShadingRateAttachment| {
            attachment_reference(ser, &mut sra.attachment)?;
            ser.pod(&mut sra.tile_size)
        },
    )
}

fn subpass_dependency<S: Serializer>(
    ser: &mut S,
    dependency: &mut SubpassDependencyDesc,
) -> Result<(), SerializeError> {
    ser.pod(&mut dependency.src_subpass)?;
    ser.pod(&mut dependency.dst_subpass)?;
    ser.wire_enum(&mut dependency.src_stage_mask)?;
    ser.wire_enum(&mut dependency.dst_stage_mask)?;
    ser.wire_enum(&mut dependency.src_access_mask)?;
    ser.wire_enum(&mut dependency.dst_access_mask)
}

/// Common data payload of a render pass.
pub(crate) fn render_pass<S: Serializer>(
    ser: &mut S,
    desc: &mut RenderPassDesc,
) -> Result<(), SerializeError> {
    ser.slice(&mut desc.attachments, render_pass_attachment)?;
    ser.slice(&mut desc.subpasses, subpass)?;
    ser.slice(&mut desc.dependencies, subpass_dependency)
}

/// One entry of a backend's shader list. The bytecode runs to the end of the
/// entry, so the entry's size in the region table delimits it.
pub(crate) fn compiled_shader<S: Serializer>(
    ser: &mut S,
    shader: &mut CompiledShader,
) -> Result<(), SerializeError> {
    ser.wire_enum(&mut shader.shader_type)?;
    ser.string(&mut shader.entry_point)?;
    ser.wire_enum(&mut shader.source_language)?;
    ser.wire_enum(&mut shader.compiler)?;
    ser.tail(&mut shader.bytecode)
}

/// Device data payload of a pipeline: indices into the backend's shader list.
pub(crate) fn shader_indices<S: Serializer>(
    ser: &mut S,
    indices: &mut Vec<u32>,
) -> Result<(), SerializeError> {
    ser.slice(indices, |ser, index| ser.pod(index))
}

/// Payload of the debug info chunk.
pub(crate) fn debug_info<S: Serializer>(
    ser: &mut S,
    info: &mut ArchiveDebugInfo,
) -> Result<(), SerializeError> {
    ser.pod(&mut info.api_version)?;
    ser.string(&mut info.git_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::PipelineType,
        serializer::{Measure, Reader, Writer},
        shader::ShaderStages,
        signature::{PipelineResourceFlags, ResourceVariableType, ShaderResourceType},
    };

    fn sample_signature() -> ResourceSignatureDesc {
        ResourceSignatureDesc {
            name: "Sig_A".to_owned(),
            binding_index: 2,
            use_combined_texture_samplers: true,
            combined_sampler_suffix: "_smp".to_owned(),
            resources: vec![
                ResourceDesc {
                    name: "cbFrame".to_owned(),
                    shader_stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
                    array_size: 1,
                    resource_type: ShaderResourceType::ConstantBuffer,
                    var_type: ResourceVariableType::Static,
                    flags: PipelineResourceFlags::empty(),
                },
                ResourceDesc {
                    name: "g_Textures".to_owned(),
                    shader_stages: ShaderStages::PIXEL,
                    array_size: 8,
                    resource_type: ShaderResourceType::TextureSrv,
                    var_type: ResourceVariableType::Mutable,
                    flags: PipelineResourceFlags::RUNTIME_ARRAY,
                },
            ],
            immutable_samplers: vec![ImmutableSamplerDesc {
                sampler_or_texture_name: "g_Textures".to_owned(),
                shader_stages: ShaderStages::PIXEL,
                desc: SamplerDesc {
                    name: "LinearClamp".to_owned(),
                    ..Default::default()
                },
            }],
        }
    }

    #[test]
    fn signature_round_trip() {
        let mut desc = sample_signature();
        let mut internal = SignatureInternalData::for_desc(&desc, PipelineType::Graphics);

        let mut measure = Measure::new();
        signature(&mut measure, &mut desc, &mut internal).unwrap();

        let mut bytes = vec![0u8; measure.size()];
        let mut writer = Writer::new(&mut bytes);
        signature(&mut writer, &mut desc, &mut internal).unwrap();
        assert!(writer.is_ended());

        let mut decoded = ResourceSignatureDesc::default();
        let mut decoded_internal = SignatureInternalData::default();
        let mut reader = Reader::new(&bytes);
        signature(&mut reader, &mut decoded, &mut decoded_internal).unwrap();
        assert!(reader.is_ended());

        // The name is carried by the chunk index, not the payload.
        decoded.name = desc.name.clone();
        assert_eq!(decoded, desc);
        assert_eq!(decoded_internal, internal);
    }

    fn encode_signature(
        desc: &mut ResourceSignatureDesc,
        internal: &mut SignatureInternalData,
    ) -> Result<crate::serializer::SerializedData, SerializeError> {
        Ok(serialize_to_data!(|ser| signature(ser, desc, internal)))
    }

    #[test]
    fn signature_serialization_is_deterministic() {
        let mut desc = sample_signature();
        let mut internal = SignatureInternalData::for_desc(&desc, PipelineType::Graphics);

        let first = encode_signature(&mut desc, &mut internal).unwrap();
        let second = encode_signature(&mut desc, &mut internal).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn graphics_pipeline_round_trip() {
        use crate::format::TextureFormat;
        use crate::pipeline::graphics::*;

        let mut desc = GraphicsPipelineDesc {
            num_render_targets: 2,
            rtv_formats: {
                let mut formats = [TextureFormat::Unknown; crate::MAX_RENDER_TARGETS];
                formats[0] = TextureFormat::Rgba8UnormSrgb;
                formats[1] = TextureFormat::Rg16Float;
                formats
            },
            dsv_format: TextureFormat::D32Float,
            input_layout: vec![LayoutElement {
                input_index: 0,
                buffer_slot: 0,
                num_components: 3,
                value_type: ValueType::Float32,
                is_normalized: false,
                ..Default::default()
            }],
            render_pass_name: Some("MainPass".to_owned()),
            ..Default::default()
        };

        let mut measure = Measure::new();
        graphics_pipeline(&mut measure, &mut desc).unwrap();

        let mut bytes = vec![0u8; measure.size()];
        let mut writer = Writer::new(&mut bytes);
        graphics_pipeline(&mut writer, &mut desc).unwrap();
        assert!(writer.is_ended());

        let mut decoded = GraphicsPipelineDesc::default();
        let mut reader = Reader::new(&bytes);
        graphics_pipeline(&mut reader, &mut decoded).unwrap();
        assert!(reader.is_ended());
        assert_eq!(decoded, desc);
    }

    #[test]
    fn ray_tracing_pipeline_round_trip() {
        let mut desc = RayTracingPipelineDesc {
            shader_record_size: 64,
            max_recursion_depth: 2,
            shader_record_name: None,
            max_attribute_size: 32,
            max_payload_size: 48,
            general_shaders: vec![RayTracingGeneralShaderGroup {
                name: "Main".to_owned(),
                shader_index: 0,
            }],
            triangle_hit_shaders: vec![RayTracingTriangleHitShaderGroup {
                name: "Hit".to_owned(),
                closest_hit_shader_index: 1,
                any_hit_shader_index: crate::SHADER_UNUSED,
            }],
            procedural_hit_shaders: Vec::new(),
        };

        let mut measure = Measure::new();
        ray_tracing_pipeline(&mut measure, &mut desc).unwrap();

        let mut bytes = vec![0u8; measure.size()];
        let mut writer = Writer::new(&mut bytes);
        ray_tracing_pipeline(&mut writer, &mut desc).unwrap();

        let mut decoded = RayTracingPipelineDesc::default();
        let mut reader = Reader::new(&bytes);
        ray_tracing_pipeline(&mut reader, &mut decoded).unwrap();
        assert_eq!(decoded, desc);
    }

    #[test]
    fn render_pass_round_trip() {
        use crate::format::TextureFormat;
        use crate::render_pass::*;

        let mut desc = RenderPassDesc {
            name: "MainPass".to_owned(),
            attachments: vec![RenderPassAttachmentDesc {
                format: TextureFormat::Bgra8Unorm,
                load_op: AttachmentLoadOp::Clear,
                final_state: ResourceStates::PRESENT,
                ..Default::default()
            }],
            subpasses: vec![SubpassDesc {
                render_target_attachments: vec![AttachmentReference {
                    attachment_index: 0,
                    state: ResourceStates::RENDER_TARGET,
                }],
                depth_stencil_attachment: None,
                ..Default::default()
            }],
            dependencies: vec![SubpassDependencyDesc {
                src_subpass: SUBPASS_EXTERNAL,
                dst_subpass: 0,
                src_stage_mask: PipelineStageFlags::RENDER_TARGET,
                dst_stage_mask: PipelineStageFlags::RENDER_TARGET,
                src_access_mask: AccessFlags::empty(),
                dst_access_mask: AccessFlags::RENDER_TARGET_WRITE,
            }],
        };

        let mut measure = Measure::new();
        render_pass(&mut measure, &mut desc).unwrap();

        let mut bytes = vec![0u8; measure.size()];
        let mut writer = Writer::new(&mut bytes);
        render_pass(&mut writer, &mut desc).unwrap();

        let mut decoded = RenderPassDesc::default();
        let mut reader = Reader::new(&bytes);
        render_pass(&mut reader, &mut decoded).unwrap();

        decoded.name = desc.name.clone();
        assert_eq!(decoded, desc);
    }

    #[test]
    fn compiled_shader_round_trip_with_tail_bytecode() {
        let mut shader = CompiledShader {
            shader_type: ShaderStages::VERTEX,
            entry_point: "VSMain".to_owned(),
            source_language: crate::shader::ShaderSourceLanguage::Hlsl,
            compiler: crate::shader::ShaderCompiler::Dxc,
            bytecode: vec![0x44, 0x58, 0x42, 0x43, 0, 1, 2, 3],
        };

        let mut measure = Measure::new();
        compiled_shader(&mut measure, &mut shader).unwrap();

        let mut bytes = vec![0u8; measure.size()];
        let mut writer = Writer::new(&mut bytes);
        compiled_shader(&mut writer, &mut shader).unwrap();

        let mut decoded = CompiledShader::default();
        let mut reader = Reader::new(&bytes);
        compiled_shader(&mut reader, &mut decoded).unwrap();
        assert_eq!(decoded, shader);
    }
}
