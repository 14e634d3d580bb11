// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Backend collaborators of the archiver.
//!
//! The archiver itself is backend-agnostic: everything device-specific goes
//! through [`DeviceBackend`]. A [`SerializationDevice`] is the explicit
//! context holding the registered backends; it is constructed by the caller
//! and shared with every [`Archiver`](super::Archiver) that uses it.

use log::warn;

use crate::{
    device::{DeviceFlags, DeviceType, DEVICE_TYPE_COUNT},
    pipeline::PipelineType,
    serializer::SerializedData,
    shader::{CompiledShader, ShaderCreateInfo},
    signature::{ResourceSignatureDesc, SignatureInternalData},
};

use super::ArchiverError;

/// Provenance recorded in the archive's debug info chunk.
#[derive(Clone, Debug, Default)]
pub struct SerializationDeviceInfo {
    /// Engine API version to record; defaults to the crate's
    /// [`API_VERSION`](crate::API_VERSION).
    pub api_version: u32,
    /// Git hash of the producing build.
    pub git_hash: Option<String>,
}

/// Device-specific compilation and layout serialization.
///
/// One implementation per backend. The archiver calls these during `add_*`
/// operations; emission never touches a backend.
pub trait DeviceBackend: Send + Sync {
    fn device_type(&self) -> DeviceType;

    /// Compiles the pipeline's shaders and patches their resource bindings
    /// against the final signature layout.
    ///
    /// Must return one record per input shader, in input order.
    fn patch_shaders(
        &self,
        shaders: &[ShaderCreateInfo],
        signatures: &[&ResourceSignatureDesc],
        pipeline_type: PipelineType,
    ) -> Result<Vec<CompiledShader>, ArchiverError>;

    /// Reflects a resource signature from the pipeline's shaders, used when a
    /// pipeline is archived without explicit signatures. The archiver assigns
    /// the name and binding index.
    fn reflect_signature(
        &self,
        shaders: &[ShaderCreateInfo],
        pipeline_type: PipelineType,
    ) -> Result<ResourceSignatureDesc, ArchiverError>;

    /// Serializes the backend's internal layout of a signature, stored in the
    /// backend's device data block.
    fn serialize_signature(
        &self,
        desc: &ResourceSignatureDesc,
        internal: &SignatureInternalData,
    ) -> Result<SerializedData, ArchiverError>;
}

/// Registry of backends available to archivers.
pub struct SerializationDevice {
    info: SerializationDeviceInfo,
    backends: [Option<Box<dyn DeviceBackend>>; DEVICE_TYPE_COUNT],
}

impl SerializationDevice {
    pub fn new(info: SerializationDeviceInfo) -> Self {
        Self {
            info,
            backends: std::array::from_fn(|_| None),
        }
    }

    pub fn info(&self) -> &SerializationDeviceInfo {
        &self.info
    }

    /// Registers a backend. Re-registering a device replaces the previous
    /// backend.
    pub fn register_backend(&mut self, backend: Box<dyn DeviceBackend>) {
        let device = backend.device_type();

        if self.backends[device.index()].replace(backend).is_some() {
            warn!("replacing previously registered {} backend", device);
        }
    }

    /// Devices that have a registered backend.
    pub fn supported_devices(&self) -> DeviceFlags {
        DeviceType::ALL
            .into_iter()
            .filter(|device| self.backends[device.index()].is_some())
            .fold(DeviceFlags::empty(), |flags, device| flags | device.flag())
    }

    pub fn backend(&self, device: DeviceType) -> Option<&dyn DeviceBackend> {
        self.backends[device.index()].as_deref()
    }
}
