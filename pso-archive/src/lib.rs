// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Cross-backend pipeline state archives.
//!
//! This crate builds, reads and repacks archives of serialized pipeline
//! state: resource signatures, render passes and graphics/compute/ray
//! tracing/tile pipelines, with per-backend compiled shader blobs stored in
//! deduplicated, independently removable blocks.
//!
//! - [`Archiver`](archiver::Archiver) is the write path. It validates and
//!   collects resources, invokes one [`DeviceBackend`](archiver::DeviceBackend)
//!   per target API to compile and patch shaders, and emits the archive in a
//!   single deterministic pass.
//!
//! - [`DeviceObjectArchive`](archive::DeviceObjectArchive) is the read path.
//!   It validates the container structure once, then serves lazy per-resource
//!   loads; [`Dearchiver`](archive::Dearchiver) layers cached device object
//!   creation on top through a [`DeviceObjectFactory`](archive::DeviceObjectFactory).
//!
//! - [`ArchiveRepacker`](archive::ArchiveRepacker) removes or transplants one
//!   backend's data block offline without touching the others.
//!
//! Archives are native-endian and addressed with 32-bit offsets; one archive
//! is limited to 4 GiB.

#[macro_use]
mod macros;

pub mod archive;
pub mod archiver;
pub mod device;
pub mod format;
pub mod pipeline;
pub mod render_pass;
pub mod serializer;
pub mod shader;
pub mod signature;

pub use archive::{
    ArchiveError, ArchiveSource, Dearchiver, DeviceObjectArchive, DeviceObjectFactory, FileSource,
    ResourceKind,
};
pub use archiver::{
    Archiver, ArchiverError, DeviceBackend, PipelineArchiveInfo, SerializationDevice,
    SerializationDeviceInfo,
};
pub use device::{DeviceFlags, DeviceType};
pub use serializer::SerializedData;

/// Version recorded in new archives' debug info chunk when the
/// [`SerializationDeviceInfo`](archiver::SerializationDeviceInfo) does not
/// override it.
pub const API_VERSION: u32 = 0x0025_0008;

/// Maximum number of resource signatures a pipeline can bind.
pub const MAX_RESOURCE_SIGNATURES: usize = 8;

/// Maximum number of simultaneous render targets.
pub const MAX_RENDER_TARGETS: usize = 8;

/// Maximum number of shader stage slots in one pipeline.
pub const MAX_SHADERS_IN_PIPELINE: usize = 6;

/// Sentinel shader index meaning "no shader" in ray tracing shader groups.
pub const SHADER_UNUSED: u32 = u32::MAX;
