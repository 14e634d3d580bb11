// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Texture formats referenced by render target and attachment descriptions.

wire_enum! {
    /// Pixel format of a texture, render target or depth-stencil attachment.
    ///
    /// Only the formats that pipeline and render pass descriptions can refer
    /// to are listed; sampling-only formats never reach the archive.
    pub enum TextureFormat {
        Unknown = 0,
        Rgba32Float = 1,
        Rgba32Uint = 2,
        Rgba32Sint = 3,
        Rgba16Float = 4,
        Rgba16Unorm = 5,
        Rgba16Uint = 6,
        Rgba16Snorm = 7,
        Rgba16Sint = 8,
        Rg32Float = 9,
        Rg32Uint = 10,
        Rg32Sint = 11,
        Rgb10A2Unorm = 12,
        Rgb10A2Uint = 13,
        R11G11B10Float = 14,
        Rgba8Unorm = 15,
        Rgba8UnormSrgb = 16,
        Rgba8Uint = 17,
        Rgba8Snorm = 18,
        Rgba8Sint = 19,
        Bgra8Unorm = 20,
        Bgra8UnormSrgb = 21,
        Rg16Float = 22,
        Rg16Unorm = 23,
        Rg16Uint = 24,
        Rg16Snorm = 25,
        Rg16Sint = 26,
        R32Float = 27,
        R32Uint = 28,
        R32Sint = 29,
        Rg8Unorm = 30,
        Rg8Uint = 31,
        Rg8Snorm = 32,
        Rg8Sint = 33,
        R16Float = 34,
        R16Unorm = 35,
        R16Uint = 36,
        R16Snorm = 37,
        R16Sint = 38,
        R8Unorm = 39,
        R8Uint = 40,
        R8Snorm = 41,
        R8Sint = 42,
        D32Float = 43,
        D32FloatS8X24Uint = 44,
        D24UnormS8Uint = 45,
        D16Unorm = 46,
    }
}

impl TextureFormat {
    /// Whether the format has a depth component.
    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::D32Float
                | TextureFormat::D32FloatS8X24Uint
                | TextureFormat::D24UnormS8Uint
                | TextureFormat::D16Unorm
        )
    }
}
