// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Target graphics backends.
//!
//! Archives carry one optional device-specific data block per backend, in the
//! fixed order of [`DeviceType::ALL`]. That order is part of the file format.

use std::{fmt, str::FromStr};

wire_enum! {
    /// A graphics backend whose device-specific data can be archived.
    ///
    /// The discriminants index the per-device arrays in archive headers.
    pub enum DeviceType {
        OpenGl = 0,
        Direct3D11 = 1,
        Direct3D12 = 2,
        Vulkan = 3,
        MetalMacOs = 4,
        MetalIos = 5,
    }
}

/// Number of backends an archive reserves space for.
pub const DEVICE_TYPE_COUNT: usize = 6;

impl DeviceType {
    /// All backends in archive block order.
    pub const ALL: [DeviceType; DEVICE_TYPE_COUNT] = [
        DeviceType::OpenGl,
        DeviceType::Direct3D11,
        DeviceType::Direct3D12,
        DeviceType::Vulkan,
        DeviceType::MetalMacOs,
        DeviceType::MetalIos,
    ];

    /// Index into per-device arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        if index < DEVICE_TYPE_COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    pub const fn flag(self) -> DeviceFlags {
        DeviceFlags(1u32 << self as u32)
    }

    pub const fn name(self) -> &'static str {
        match self {
            DeviceType::OpenGl => "OpenGL",
            DeviceType::Direct3D11 => "Direct3D11",
            DeviceType::Direct3D12 => "Direct3D12",
            DeviceType::Vulkan => "Vulkan",
            DeviceType::MetalMacOs => "Metal-macOS",
            DeviceType::MetalIos => "Metal-iOS",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceType {
    type Err = UnknownDeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gl" | "opengl" | "OpenGL" => Ok(DeviceType::OpenGl),
            "d3d11" | "Direct3D11" => Ok(DeviceType::Direct3D11),
            "d3d12" | "Direct3D12" => Ok(DeviceType::Direct3D12),
            "vk" | "vulkan" | "Vulkan" => Ok(DeviceType::Vulkan),
            "metal-macos" | "Metal-macOS" => Ok(DeviceType::MetalMacOs),
            "metal-ios" | "Metal-iOS" => Ok(DeviceType::MetalIos),
            _ => Err(UnknownDeviceError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an unrecognized backend name.
#[derive(Clone, Debug)]
pub struct UnknownDeviceError(pub String);

impl fmt::Display for UnknownDeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown device type `{}` (expected one of gl, d3d11, d3d12, vk, metal-macos, \
            metal-ios)",
            self.0,
        )
    }
}

impl std::error::Error for UnknownDeviceError {}

wire_flags! {
    /// Set of backends, used to select which device data an operation covers.
    pub struct DeviceFlags {
        const OPEN_GL = 1 << 0;
        const DIRECT3D11 = 1 << 1;
        const DIRECT3D12 = 1 << 2;
        const VULKAN = 1 << 3;
        const METAL_MACOS = 1 << 4;
        const METAL_IOS = 1 << 5;
    }
}

impl DeviceFlags {
    /// Iterates over the devices in the set, in archive block order.
    pub fn devices(self) -> impl Iterator<Item = DeviceType> {
        DeviceType::ALL
            .into_iter()
            .filter(move |device| self.contains(device.flag()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_match_indices() {
        for (index, device) in DeviceType::ALL.into_iter().enumerate() {
            assert_eq!(device.index(), index);
            assert_eq!(device.flag().bits(), 1 << index);
            assert_eq!(DeviceType::from_index(index), Some(device));
        }

        assert_eq!(DeviceType::from_index(DEVICE_TYPE_COUNT), None);
    }

    #[test]
    fn device_iteration_follows_block_order() {
        let flags = DeviceFlags::VULKAN | DeviceFlags::OPEN_GL | DeviceFlags::METAL_IOS;
        let devices: Vec<_> = flags.devices().collect();

        assert_eq!(
            devices,
            [DeviceType::OpenGl, DeviceType::Vulkan, DeviceType::MetalIos]
        );
    }
}
