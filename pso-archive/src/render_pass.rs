// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Render pass descriptions.
//!
//! Render passes are archived once under their name; graphics pipelines refer
//! to them by name instead of embedding the description.

use crate::format::TextureFormat;

/// Marks an attachment reference as unused.
pub const ATTACHMENT_UNUSED: u32 = u32::MAX;

/// Subpass index denoting a dependency on work outside the render pass.
pub const SUBPASS_EXTERNAL: u32 = u32::MAX;

wire_flags! {
    /// State a resource is in when an attachment is used or transitioned.
    pub struct ResourceStates {
        const VERTEX_BUFFER = 1 << 0;
        const CONSTANT_BUFFER = 1 << 1;
        const INDEX_BUFFER = 1 << 2;
        const RENDER_TARGET = 1 << 3;
        const UNORDERED_ACCESS = 1 << 4;
        const DEPTH_WRITE = 1 << 5;
        const DEPTH_READ = 1 << 6;
        const SHADER_RESOURCE = 1 << 7;
        const STREAM_OUT = 1 << 8;
        const INDIRECT_ARGUMENT = 1 << 9;
        const COPY_DEST = 1 << 10;
        const COPY_SOURCE = 1 << 11;
        const RESOLVE_DEST = 1 << 12;
        const RESOLVE_SOURCE = 1 << 13;
        const INPUT_ATTACHMENT = 1 << 14;
        const PRESENT = 1 << 15;
        const COMMON = 1 << 16;
        const SHADING_RATE = 1 << 17;
    }
}

wire_flags! {
    /// Pipeline stages referenced by subpass dependencies.
    pub struct PipelineStageFlags {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const HULL_SHADER = 1 << 4;
        const DOMAIN_SHADER = 1 << 5;
        const GEOMETRY_SHADER = 1 << 6;
        const PIXEL_SHADER = 1 << 7;
        const EARLY_FRAGMENT_TESTS = 1 << 8;
        const LATE_FRAGMENT_TESTS = 1 << 9;
        const RENDER_TARGET = 1 << 10;
        const COMPUTE_SHADER = 1 << 11;
        const TRANSFER = 1 << 12;
        const BOTTOM_OF_PIPE = 1 << 13;
        const SHADING_RATE_TEXTURE = 1 << 14;
    }
}

wire_flags! {
    /// Memory access types referenced by subpass dependencies.
    pub struct AccessFlags {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const INPUT_ATTACHMENT_READ = 1 << 4;
        const SHADER_READ = 1 << 5;
        const SHADER_WRITE = 1 << 6;
        const RENDER_TARGET_READ = 1 << 7;
        const RENDER_TARGET_WRITE = 1 << 8;
        const DEPTH_STENCIL_READ = 1 << 9;
        const DEPTH_STENCIL_WRITE = 1 << 10;
        const COPY_READ = 1 << 11;
        const COPY_WRITE = 1 << 12;
        const MEMORY_READ = 1 << 13;
        const MEMORY_WRITE = 1 << 14;
    }
}

wire_enum! {
    /// What happens to attachment contents at the start of a subpass.
    pub enum AttachmentLoadOp {
        Load = 0,
        Clear = 1,
        Discard = 2,
    }
}

wire_enum! {
    /// What happens to attachment contents at the end of a subpass.
    pub enum AttachmentStoreOp {
        Store = 0,
        Discard = 1,
    }
}

/// One attachment of a render pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderPassAttachmentDesc {
    pub format: TextureFormat,
    pub sample_count: u8,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
    pub stencil_load_op: AttachmentLoadOp,
    pub stencil_store_op: AttachmentStoreOp,
    pub initial_state: ResourceStates,
    pub final_state: ResourceStates,
}

impl Default for RenderPassAttachmentDesc {
    fn default() -> Self {
        Self {
            format: TextureFormat::Unknown,
            sample_count: 1,
            load_op: AttachmentLoadOp::Load,
            store_op: AttachmentStoreOp::Store,
            stencil_load_op: AttachmentLoadOp::Load,
            stencil_store_op: AttachmentStoreOp::Store,
            initial_state: ResourceStates::empty(),
            final_state: ResourceStates::empty(),
        }
    }
}

/// Reference from a subpass to an attachment, with the state the attachment
/// must be in while the subpass executes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentReference {
    pub attachment_index: u32,
    pub state: ResourceStates,
}

impl Default for AttachmentReference {
    fn default() -> Self {
        Self {
            attachment_index: ATTACHMENT_UNUSED,
            state: ResourceStates::empty(),
        }
    }
}

/// Shading rate attachment of a subpass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShadingRateAttachment {
    pub attachment: AttachmentReference,
    pub tile_size: [u32; 2],
}

/// One subpass of a render pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubpassDesc {
    pub input_attachments: Vec<AttachmentReference>,
    pub render_target_attachments: Vec<AttachmentReference>,
    /// Either empty or the same length as `render_target_attachments`.
    pub resolve_attachments: Vec<AttachmentReference>,
    pub depth_stencil_attachment: Option<AttachmentReference>,
    pub preserve_attachments: Vec<u32>,
    pub shading_rate_attachment: Option<ShadingRateAttachment>,
}

/// Execution and memory dependency between two subpasses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubpassDependencyDesc {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage_mask: PipelineStageFlags,
    pub dst_stage_mask: PipelineStageFlags,
    pub src_access_mask: AccessFlags,
    pub dst_access_mask: AccessFlags,
}

/// Description of a render pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub name: String,
    pub attachments: Vec<RenderPassAttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<SubpassDependencyDesc>,
}
