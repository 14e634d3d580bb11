// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Fixed-function state of graphics and mesh pipelines.

use crate::{format::TextureFormat, signature::ComparisonFunction, MAX_RENDER_TARGETS};

wire_enum! {
    /// Source or destination factor of a blend equation.
    pub enum BlendFactor {
        Undefined = 0,
        Zero = 1,
        One = 2,
        SrcColor = 3,
        InvSrcColor = 4,
        SrcAlpha = 5,
        InvSrcAlpha = 6,
        DestAlpha = 7,
        InvDestAlpha = 8,
        DestColor = 9,
        InvDestColor = 10,
        SrcAlphaSat = 11,
        BlendFactor = 12,
        InvBlendFactor = 13,
        Src1Color = 14,
        InvSrc1Color = 15,
        Src1Alpha = 16,
        InvSrc1Alpha = 17,
    }
}

wire_enum! {
    /// Operator combining the blend factors.
    pub enum BlendOperation {
        Undefined = 0,
        Add = 1,
        Subtract = 2,
        RevSubtract = 3,
        Min = 4,
        Max = 5,
    }
}

wire_enum! {
    /// Bitwise operation applied instead of blending.
    pub enum LogicOperation {
        Clear = 0,
        Set = 1,
        Copy = 2,
        CopyInverted = 3,
        Noop = 4,
        Invert = 5,
        And = 6,
        Nand = 7,
        Or = 8,
        Nor = 9,
        Xor = 10,
        Equiv = 11,
        AndReverse = 12,
        AndInverted = 13,
        OrReverse = 14,
        OrInverted = 15,
    }
}

wire_flags! {
    /// Color channels a render target write affects.
    pub struct ColorMask {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
    }
}

/// Blend state of one render target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderTargetBlendDesc {
    pub blend_enable: bool,
    pub logic_operation_enable: bool,
    pub src_blend: BlendFactor,
    pub dest_blend: BlendFactor,
    pub blend_op: BlendOperation,
    pub src_blend_alpha: BlendFactor,
    pub dest_blend_alpha: BlendFactor,
    pub blend_op_alpha: BlendOperation,
    pub logic_op: LogicOperation,
    pub render_target_write_mask: ColorMask,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            logic_operation_enable: false,
            src_blend: BlendFactor::One,
            dest_blend: BlendFactor::Zero,
            blend_op: BlendOperation::Add,
            src_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::Zero,
            blend_op_alpha: BlendOperation::Add,
            logic_op: LogicOperation::Noop,
            render_target_write_mask: ColorMask::all(),
        }
    }
}

/// Blend state of the whole pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlendStateDesc {
    pub alpha_to_coverage_enable: bool,
    /// When unset, only `render_targets[0]` applies.
    pub independent_blend_enable: bool,
    pub render_targets: [RenderTargetBlendDesc; MAX_RENDER_TARGETS],
}

wire_enum! {
    /// Triangle fill mode.
    pub enum FillMode {
        Undefined = 0,
        Wireframe = 1,
        Solid = 2,
    }
}

wire_enum! {
    /// Face culling mode.
    pub enum CullMode {
        Undefined = 0,
        None = 1,
        Front = 2,
        Back = 3,
    }
}

/// Rasterizer state.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterizerStateDesc {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub antialiased_line_enable: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
}

impl Default for RasterizerStateDesc {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_clip_enable: true,
            scissor_enable: false,
            antialiased_line_enable: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
        }
    }
}

wire_enum! {
    /// Operation on the stencil buffer.
    pub enum StencilOp {
        Undefined = 0,
        Keep = 1,
        Zero = 2,
        Replace = 3,
        IncrSat = 4,
        DecrSat = 5,
        Invert = 6,
        IncrWrap = 7,
        DecrWrap = 8,
    }
}

/// Stencil operations for one face orientation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StencilOpDesc {
    pub stencil_fail_op: StencilOp,
    pub stencil_depth_fail_op: StencilOp,
    pub stencil_pass_op: StencilOp,
    pub stencil_func: ComparisonFunction,
}

impl Default for StencilOpDesc {
    fn default() -> Self {
        Self {
            stencil_fail_op: StencilOp::Keep,
            stencil_depth_fail_op: StencilOp::Keep,
            stencil_pass_op: StencilOp::Keep,
            stencil_func: ComparisonFunction::Always,
        }
    }
}

/// Depth-stencil state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepthStencilStateDesc {
    pub depth_enable: bool,
    pub depth_write_enable: bool,
    pub depth_func: ComparisonFunction,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: StencilOpDesc,
    pub back_face: StencilOpDesc,
}

impl Default for DepthStencilStateDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_enable: true,
            depth_func: ComparisonFunction::Less,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front_face: StencilOpDesc::default(),
            back_face: StencilOpDesc::default(),
        }
    }
}

wire_enum! {
    /// Component type of a vertex attribute.
    pub enum ValueType {
        Undefined = 0,
        Int8 = 1,
        Int16 = 2,
        Int32 = 3,
        Uint8 = 4,
        Uint16 = 5,
        Uint32 = 6,
        Float16 = 7,
        Float32 = 8,
    }
}

wire_enum! {
    /// Rate at which a vertex attribute advances.
    pub enum InputElementFrequency {
        Undefined = 0,
        PerVertex = 1,
        PerInstance = 2,
    }
}

/// Sentinel for layout element offsets and strides computed from the other
/// elements of the same buffer slot.
pub const LAYOUT_ELEMENT_AUTO: u32 = u32::MAX;

/// One vertex attribute of the input layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutElement {
    pub input_index: u32,
    pub buffer_slot: u32,
    pub num_components: u32,
    pub value_type: ValueType,
    pub is_normalized: bool,
    pub relative_offset: u32,
    pub stride: u32,
    pub frequency: InputElementFrequency,
    pub instance_data_step_rate: u32,
}

impl Default for LayoutElement {
    fn default() -> Self {
        Self {
            input_index: 0,
            buffer_slot: 0,
            num_components: 0,
            value_type: ValueType::Float32,
            is_normalized: true,
            relative_offset: LAYOUT_ELEMENT_AUTO,
            stride: LAYOUT_ELEMENT_AUTO,
            frequency: InputElementFrequency::PerVertex,
            instance_data_step_rate: 1,
        }
    }
}

wire_enum! {
    /// Primitive assembly topology.
    pub enum PrimitiveTopology {
        Undefined = 0,
        TriangleList = 1,
        TriangleStrip = 2,
        PointList = 3,
        LineList = 4,
        LineStrip = 5,
        TriangleListAdjacent = 6,
        TriangleStripAdjacent = 7,
        LineListAdjacent = 8,
        LineStripAdjacent = 9,
    }
}

wire_flags! {
    /// Variable shading rate capabilities a pipeline opts into.
    pub struct PipelineShadingRateFlags {
        const PER_PRIMITIVE = 1 << 0;
        const TEXTURE_BASED = 1 << 1;
    }
}

/// Multisampling parameters of render targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleDesc {
    pub count: u8,
    pub quality: u8,
}

impl Default for SampleDesc {
    fn default() -> Self {
        Self {
            count: 1,
            quality: 0,
        }
    }
}

/// Fixed-function description of a graphics or mesh pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphicsPipelineDesc {
    pub blend: BlendStateDesc,
    pub sample_mask: u32,
    pub rasterizer: RasterizerStateDesc,
    pub depth_stencil: DepthStencilStateDesc,
    pub input_layout: Vec<LayoutElement>,
    pub primitive_topology: PrimitiveTopology,
    pub num_viewports: u8,
    pub num_render_targets: u8,
    pub subpass_index: u8,
    pub shading_rate_flags: PipelineShadingRateFlags,
    pub rtv_formats: [TextureFormat; MAX_RENDER_TARGETS],
    pub dsv_format: TextureFormat,
    pub sample: SampleDesc,
    /// Name of the render pass this pipeline is used with, if any.
    pub render_pass_name: Option<String>,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            blend: BlendStateDesc::default(),
            sample_mask: u32::MAX,
            rasterizer: RasterizerStateDesc::default(),
            depth_stencil: DepthStencilStateDesc::default(),
            input_layout: Vec::new(),
            primitive_topology: PrimitiveTopology::TriangleList,
            num_viewports: 1,
            num_render_targets: 0,
            subpass_index: 0,
            shading_rate_flags: PipelineShadingRateFlags::empty(),
            rtv_formats: [TextureFormat::Unknown; MAX_RENDER_TARGETS],
            dsv_format: TextureFormat::Unknown,
            sample: SampleDesc::default(),
            render_pass_name: None,
        }
    }
}
