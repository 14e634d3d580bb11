// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Shader descriptions and compiled shader records.

wire_flags! {
    /// Pipeline stages a shader or resource is visible to.
    pub struct ShaderStages {
        const VERTEX = 1 << 0;
        const PIXEL = 1 << 1;
        const GEOMETRY = 1 << 2;
        const HULL = 1 << 3;
        const DOMAIN = 1 << 4;
        const COMPUTE = 1 << 5;
        const AMPLIFICATION = 1 << 6;
        const MESH = 1 << 7;
        const RAY_GEN = 1 << 8;
        const RAY_MISS = 1 << 9;
        const RAY_CLOSEST_HIT = 1 << 10;
        const RAY_ANY_HIT = 1 << 11;
        const RAY_INTERSECTION = 1 << 12;
        const CALLABLE = 1 << 13;
        const TILE = 1 << 14;
    }
}

impl ShaderStages {
    /// All stages that can appear in a graphics pipeline.
    pub const ALL_GRAPHICS: Self = Self(
        Self::VERTEX.0
            | Self::PIXEL.0
            | Self::GEOMETRY.0
            | Self::HULL.0
            | Self::DOMAIN.0
            | Self::AMPLIFICATION.0
            | Self::MESH.0,
    );

    /// All ray tracing stages.
    pub const ALL_RAY_TRACING: Self = Self(
        Self::RAY_GEN.0
            | Self::RAY_MISS.0
            | Self::RAY_CLOSEST_HIT.0
            | Self::RAY_ANY_HIT.0
            | Self::RAY_INTERSECTION.0
            | Self::CALLABLE.0,
    );

    /// Whether exactly one stage bit is set.
    #[inline]
    pub const fn is_single_stage(self) -> bool {
        self.0 != 0 && self.0 & (self.0 - 1) == 0
    }
}

wire_enum! {
    /// Source language a shader was authored in.
    pub enum ShaderSourceLanguage {
        Default = 0,
        Hlsl = 1,
        Glsl = 2,
        GlslVerbatim = 3,
        Msl = 4,
    }
}

wire_enum! {
    /// Compiler used to produce the archived bytecode.
    pub enum ShaderCompiler {
        Default = 0,
        Glslang = 1,
        Dxc = 2,
        Fxc = 3,
    }
}

/// Identity of a shader within a pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderDesc {
    pub name: String,
    /// Exactly one stage bit.
    pub shader_type: ShaderStages,
}

/// Input to the archiver: a shader to be compiled and patched per backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderCreateInfo {
    pub desc: ShaderDesc,
    pub entry_point: String,
    pub source_language: ShaderSourceLanguage,
    pub compiler: ShaderCompiler,
    pub source: ShaderSource,
}

impl Default for ShaderCreateInfo {
    fn default() -> Self {
        Self {
            desc: ShaderDesc::default(),
            entry_point: "main".to_owned(),
            source_language: ShaderSourceLanguage::Default,
            compiler: ShaderCompiler::Default,
            source: ShaderSource::default(),
        }
    }
}

/// Shader source text or precompiled bytecode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShaderSource {
    Text(String),
    Bytecode(Vec<u8>),
}

impl Default for ShaderSource {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// A backend-compiled shader as stored in a device data block.
///
/// This record is the unit of shader deduplication: two pipelines referring to
/// shaders whose records serialize to identical bytes share one archive entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledShader {
    /// Exactly one stage bit.
    pub shader_type: ShaderStages,
    pub entry_point: String,
    pub source_language: ShaderSourceLanguage,
    pub compiler: ShaderCompiler,
    pub bytecode: Vec<u8>,
}
