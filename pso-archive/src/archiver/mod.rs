// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Building archives.
//!
//! [`Archiver`] collects resource signatures, render passes and pipelines,
//! deduplicates shaders per backend, and emits the archive in one pass of
//! exact-size buffers. Validation happens in the `add_*` operations; emission
//! only lays out bytes and computes offsets, so it cannot fail on content.
//!
//! Every `add_*` call is atomic: all validation and cross-backend work runs
//! before any state is committed, so a failed call leaves the archiver
//! exactly as it was.

use std::{collections::BTreeMap, error::Error, fmt, io, mem, sync::Arc};

use foldhash::HashMap;
use log::debug;

use crate::{
    archive::{
        schema, ArchiveDebugInfo, ArchiveHeader, ArchiveRegion, ChunkHeader, ChunkType,
        DataHeader, NamedResourceArrayHeader, ResourceKind, RpDataHeader, ARCHIVE_MAGIC,
        ARCHIVE_VERSION, INVALID_OFFSET, RESOURCE_KIND_COUNT,
    },
    device::{DeviceFlags, DeviceType, DEVICE_TYPE_COUNT},
    pipeline::{
        ComputePipelineCreateInfo, GraphicsPipelineCreateInfo, GraphicsPipelineDesc,
        PipelineBaseData, PipelineResourceLayoutDesc, PipelineStateFlags, PipelineType,
        RayTracingPipelineCreateInfo, RayTracingPipelineDesc, TilePipelineCreateInfo,
        TilePipelineDesc,
    },
    render_pass::RenderPassDesc,
    serializer::{SerializedData, SerializeError},
    shader::{CompiledShader, ShaderCreateInfo, ShaderStages},
    signature::{ResourceSignatureDesc, SignatureInternalData},
    API_VERSION, MAX_RESOURCE_SIGNATURES, SHADER_UNUSED,
};

pub mod backend;

pub use backend::{DeviceBackend, SerializationDevice, SerializationDeviceInfo};

/// Error type for archiver operations.
#[derive(Debug)]
pub enum ArchiverError {
    /// Invalid input to an `add_*` operation.
    InvalidArgument { message: String },
    /// A requested device has no registered backend.
    UnsupportedDevice { device: DeviceType },
    /// A resource with the same name but different content already exists.
    DuplicateName { kind: ResourceKind, name: String },
    /// Re-adding a resource produced different device data for a backend that
    /// already has data.
    ConflictingDeviceData {
        kind: ResourceKind,
        name: String,
        device: DeviceType,
    },
    /// A backend failed to compile, patch or serialize.
    Backend {
        device: DeviceType,
        message: String,
    },
    /// Backends reflected different default signatures for one pipeline.
    DefaultSignatureMismatch {
        pipeline: String,
        device: DeviceType,
    },
    /// The archive would exceed the 4 GiB the offset format can address.
    ArchiveTooLarge { size: u64 },
    Serialize(SerializeError),
    Io(io::Error),
}

impl ArchiverError {
    /// Shorthand for backend failures.
    pub fn backend(device: DeviceType, message: impl Into<String>) -> Self {
        Self::Backend {
            device,
            message: message.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

impl fmt::Display for ArchiverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { message } => write!(f, "invalid argument: {}", message),
            Self::UnsupportedDevice { device } => {
                write!(f, "no {} backend is registered", device)
            }
            Self::DuplicateName { kind, name } => {
                write!(
                    f,
                    "a {} named `{}` with different content is already archived",
                    kind, name,
                )
            }
            Self::ConflictingDeviceData { kind, name, device } => {
                write!(
                    f,
                    "{} `{}` already has different {} data",
                    kind, name, device,
                )
            }
            Self::Backend { device, message } => {
                write!(f, "{} backend failed: {}", device, message)
            }
            Self::DefaultSignatureMismatch { pipeline, device } => {
                write!(
                    f,
                    "{} reflected a different default signature for pipeline `{}` than the \
                    preceding backends",
                    device, pipeline,
                )
            }
            Self::ArchiveTooLarge { size } => {
                write!(f, "archive size {} exceeds the 32-bit offset range", size)
            }
            Self::Serialize(err) => write!(f, "serialization failed: {}", err),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl Error for ArchiverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialize(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SerializeError> for ArchiverError {
    fn from(err: SerializeError) -> Self {
        Self::Serialize(err)
    }
}

impl From<io::Error> for ArchiverError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Archiving options of one `add_*_pipeline` call.
#[derive(Clone, Copy, Debug)]
pub struct PipelineArchiveInfo {
    /// Backends to compile and store device data for.
    pub device_flags: DeviceFlags,
}

/// Per-backend device data of one archived resource.
#[derive(Debug, PartialEq)]
enum DeviceDatum {
    /// Opaque backend blob (signature layouts).
    Blob(SerializedData),
    /// Indices into the backend's shader list (pipelines). Encoded at
    /// emission time.
    ShaderIndices(Vec<u32>),
}

/// One archived named resource: common payload plus optional per-backend data.
#[derive(Debug, Default)]
struct ResourceEntry {
    common: SerializedData,
    device: [Option<DeviceDatum>; DEVICE_TYPE_COUNT],
}

/// Per-backend shader list with content deduplication.
#[derive(Default)]
struct DeviceShaders {
    dedup: HashMap<Arc<SerializedData>, u32>,
    list: Vec<Arc<SerializedData>>,
}

impl DeviceShaders {
    fn intern(&mut self, record: SerializedData) -> u32 {
        if let Some(&index) = self.dedup.get(&record) {
            return index;
        }

        let index = self.list.len() as u32;
        let record = Arc::new(record);
        self.list.push(record.clone());
        self.dedup.insert(record, index);

        index
    }
}

/// Staged, fully validated state of one `add_*` call, applied only after
/// every fallible step has succeeded.
#[derive(Default)]
struct PendingAdd {
    /// Dependencies and the main resource, each merged into the archiver's
    /// maps on commit.
    entries: Vec<(ResourceKind, String, ResourceEntry)>,
    /// Serialized shader records to intern, per backend.
    records: [Vec<SerializedData>; DEVICE_TYPE_COUNT],
}

/// Collects resources and emits pipeline archives.
pub struct Archiver {
    device: Arc<SerializationDevice>,
    /// Named resources by kind; `BTreeMap` makes emission order (and so the
    /// output bytes) deterministic.
    named: [BTreeMap<String, ResourceEntry>; RESOURCE_KIND_COUNT],
    shaders: [DeviceShaders; DEVICE_TYPE_COUNT],
}

impl Archiver {
    pub fn new(device: Arc<SerializationDevice>) -> Self {
        Self {
            device,
            named: Default::default(),
            shaders: Default::default(),
        }
    }

    pub fn serialization_device(&self) -> &Arc<SerializationDevice> {
        &self.device
    }

    /// Discards all collected resources.
    pub fn reset(&mut self) {
        self.named = Default::default();
        self.shaders = Default::default();
    }

    /// Number of archived resources of a kind.
    pub fn resource_count(&self, kind: ResourceKind) -> usize {
        self.named[kind.index()].len()
    }

    // ---------------------------------------------------------------- add

    /// Archives a resource signature for the given backends.
    ///
    /// Re-adding an identical signature is a no-op; it may extend the set of
    /// backends that carry data for it.
    pub fn add_resource_signature(
        &mut self,
        desc: &ResourceSignatureDesc,
        pipeline_type: PipelineType,
        device_flags: DeviceFlags,
    ) -> Result<(), ArchiverError> {
        let flags = self.validate_device_flags(device_flags)?;
        validate_name(ResourceKind::Signature, &desc.name)?;

        let (name, entry) = self.build_signature_entry(desc, pipeline_type, flags)?;
        self.check_merge(ResourceKind::Signature, &name, &entry)?;
        self.apply_merge(ResourceKind::Signature, name, entry);

        Ok(())
    }

    /// Archives a render pass. Re-adding an identical render pass is a no-op.
    pub fn add_render_pass(&mut self, desc: &RenderPassDesc) -> Result<(), ArchiverError> {
        validate_name(ResourceKind::RenderPass, &desc.name)?;

        let entry = ResourceEntry {
            common: encode_render_pass(desc)?,
            device: Default::default(),
        };

        self.check_merge(ResourceKind::RenderPass, &desc.name, &entry)?;
        self.apply_merge(ResourceKind::RenderPass, desc.name.clone(), entry);

        Ok(())
    }

    /// Archives a graphics or mesh pipeline for the given backends, together
    /// with its render pass and signatures.
    pub fn add_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineCreateInfo,
        archive_info: &PipelineArchiveInfo,
    ) -> Result<(), ArchiverError> {
        let flags = self.validate_device_flags(archive_info.device_flags)?;
        validate_name(ResourceKind::GraphicsPipeline, &info.name)?;

        let pipeline_type = graphics_pipeline_type(&info.name, &info.shaders)?;

        let mut pending = PendingAdd::default();
        let mut desc = info.graphics.clone();

        if let Some(render_pass) = &info.render_pass {
            validate_name(ResourceKind::RenderPass, &render_pass.name)?;

            if let Some(referenced) = &desc.render_pass_name {
                if *referenced != render_pass.name {
                    return Err(ArchiverError::invalid(format!(
                        "pipeline `{}` references render pass `{}` but provides `{}`",
                        info.name, referenced, render_pass.name,
                    )));
                }
            }

            desc.render_pass_name = Some(render_pass.name.clone());

            let entry = ResourceEntry {
                common: encode_render_pass(render_pass)?,
                device: Default::default(),
            };
            self.check_merge(ResourceKind::RenderPass, &render_pass.name, &entry)?;
            pending
                .entries
                .push((ResourceKind::RenderPass, render_pass.name.clone(), entry));
        } else if let Some(referenced) = &desc.render_pass_name {
            if !self.named[ResourceKind::RenderPass.index()].contains_key(referenced) {
                return Err(ArchiverError::invalid(format!(
                    "pipeline `{}` references render pass `{}`, which has not been archived",
                    info.name, referenced,
                )));
            }
        }

        let mut base = self.prepare_pipeline(
            &mut pending,
            &info.name,
            pipeline_type,
            info.flags,
            &info.resource_layout,
            &info.signatures,
            &info.shaders,
            flags,
        )?;

        let common = encode_graphics_common(&mut base, &mut desc)?;

        let entry = self.pipeline_entry(common, &pending, flags);
        self.check_merge(ResourceKind::GraphicsPipeline, &info.name, &entry)?;
        pending
            .entries
            .push((ResourceKind::GraphicsPipeline, info.name.clone(), entry));

        self.commit(pending);

        Ok(())
    }

    /// Archives a compute pipeline for the given backends.
    pub fn add_compute_pipeline(
        &mut self,
        info: &ComputePipelineCreateInfo,
        archive_info: &PipelineArchiveInfo,
    ) -> Result<(), ArchiverError> {
        let flags = self.validate_device_flags(archive_info.device_flags)?;
        validate_name(ResourceKind::ComputePipeline, &info.name)?;

        if info.shader.desc.shader_type != ShaderStages::COMPUTE {
            return Err(ArchiverError::invalid(format!(
                "compute pipeline `{}` requires exactly one compute shader",
                info.name,
            )));
        }

        let shaders = std::slice::from_ref(&info.shader);
        let mut pending = PendingAdd::default();

        let mut base = self.prepare_pipeline(
            &mut pending,
            &info.name,
            PipelineType::Compute,
            info.flags,
            &info.resource_layout,
            &info.signatures,
            shaders,
            flags,
        )?;

        let common = encode_compute_common(&mut base)?;

        let entry = self.pipeline_entry(common, &pending, flags);
        self.check_merge(ResourceKind::ComputePipeline, &info.name, &entry)?;
        pending
            .entries
            .push((ResourceKind::ComputePipeline, info.name.clone(), entry));

        self.commit(pending);

        Ok(())
    }

    /// Archives a tile pipeline for the given backends.
    pub fn add_tile_pipeline(
        &mut self,
        info: &TilePipelineCreateInfo,
        archive_info: &PipelineArchiveInfo,
    ) -> Result<(), ArchiverError> {
        let flags = self.validate_device_flags(archive_info.device_flags)?;
        validate_name(ResourceKind::TilePipeline, &info.name)?;

        if info.shader.desc.shader_type != ShaderStages::TILE {
            return Err(ArchiverError::invalid(format!(
                "tile pipeline `{}` requires exactly one tile shader",
                info.name,
            )));
        }

        let shaders = std::slice::from_ref(&info.shader);
        let mut pending = PendingAdd::default();

        let mut base = self.prepare_pipeline(
            &mut pending,
            &info.name,
            PipelineType::Tile,
            info.flags,
            &info.resource_layout,
            &info.signatures,
            shaders,
            flags,
        )?;

        let mut desc = info.tile.clone();
        let common = encode_tile_common(&mut base, &mut desc)?;

        let entry = self.pipeline_entry(common, &pending, flags);
        self.check_merge(ResourceKind::TilePipeline, &info.name, &entry)?;
        pending
            .entries
            .push((ResourceKind::TilePipeline, info.name.clone(), entry));

        self.commit(pending);

        Ok(())
    }

    /// Archives a ray tracing pipeline for the given backends.
    pub fn add_ray_tracing_pipeline(
        &mut self,
        info: &RayTracingPipelineCreateInfo,
        archive_info: &PipelineArchiveInfo,
    ) -> Result<(), ArchiverError> {
        let flags = self.validate_device_flags(archive_info.device_flags)?;
        validate_name(ResourceKind::RayTracingPipeline, &info.name)?;
        validate_ray_tracing_groups(info)?;

        for shader in &info.shaders {
            if !shader.desc.shader_type.is_single_stage()
                || !ShaderStages::ALL_RAY_TRACING.contains(shader.desc.shader_type)
            {
                return Err(ArchiverError::invalid(format!(
                    "shader `{}` of ray tracing pipeline `{}` must have exactly one ray \
                    tracing stage",
                    shader.desc.name, info.name,
                )));
            }
        }

        let mut pending = PendingAdd::default();

        let mut base = self.prepare_pipeline(
            &mut pending,
            &info.name,
            PipelineType::RayTracing,
            info.flags,
            &info.resource_layout,
            &info.signatures,
            &info.shaders,
            flags,
        )?;

        let mut desc = info.ray_tracing.clone();
        let common = encode_ray_tracing_common(&mut base, &mut desc)?;

        let entry = self.pipeline_entry(common, &pending, flags);
        self.check_merge(ResourceKind::RayTracingPipeline, &info.name, &entry)?;
        pending
            .entries
            .push((ResourceKind::RayTracingPipeline, info.name.clone(), entry));

        self.commit(pending);

        Ok(())
    }

    // ----------------------------------------------------------- internals

    fn validate_device_flags(&self, flags: DeviceFlags) -> Result<DeviceFlags, ArchiverError> {
        if flags.is_empty() {
            return Err(ArchiverError::invalid(
                "device flags must select at least one backend",
            ));
        }

        for device in flags.devices() {
            if self.device.backend(device).is_none() {
                return Err(ArchiverError::UnsupportedDevice { device });
            }
        }

        Ok(flags)
    }

    /// Builds the archive entry of one signature: common payload plus the
    /// backend layout blob for each requested device.
    fn build_signature_entry(
        &self,
        desc: &ResourceSignatureDesc,
        pipeline_type: PipelineType,
        flags: DeviceFlags,
    ) -> Result<(String, ResourceEntry), ArchiverError> {
        if usize::from(desc.binding_index) >= MAX_RESOURCE_SIGNATURES {
            return Err(ArchiverError::invalid(format!(
                "signature `{}` has binding index {}, the maximum is {}",
                desc.name,
                desc.binding_index,
                MAX_RESOURCE_SIGNATURES - 1,
            )));
        }

        let internal = SignatureInternalData::for_desc(desc, pipeline_type);
        let common = encode_signature(desc, &internal)?;

        let mut entry = ResourceEntry {
            common,
            device: Default::default(),
        };

        for device in flags.devices() {
            let backend = self.backend(device)?;
            let blob = backend.serialize_signature(desc, &internal)?;
            entry.device[device.index()] = Some(DeviceDatum::Blob(blob));
        }

        Ok((desc.name.clone(), entry))
    }

    fn backend(&self, device: DeviceType) -> Result<&dyn DeviceBackend, ArchiverError> {
        self.device
            .backend(device)
            .ok_or(ArchiverError::UnsupportedDevice { device })
    }

    /// Shared `add_*_pipeline` front half: validates shaders and signatures,
    /// stages signature entries (synthesizing the default signature when none
    /// are given), patches shaders per backend and stages their records.
    ///
    /// Returns the pipeline's base data with signature names filled in.
    fn prepare_pipeline(
        &self,
        pending: &mut PendingAdd,
        name: &str,
        pipeline_type: PipelineType,
        pso_flags: PipelineStateFlags,
        resource_layout: &PipelineResourceLayoutDesc,
        signatures: &[ResourceSignatureDesc],
        shaders: &[ShaderCreateInfo],
        flags: DeviceFlags,
    ) -> Result<PipelineBaseData, ArchiverError> {
        if shaders.is_empty() {
            return Err(ArchiverError::invalid(format!(
                "pipeline `{}` has no shaders",
                name,
            )));
        }

        for shader in shaders {
            if !shader.desc.shader_type.is_single_stage() {
                return Err(ArchiverError::invalid(format!(
                    "shader `{}` of pipeline `{}` must have exactly one stage",
                    shader.desc.name, name,
                )));
            }
        }

        // Resolve the signature set: explicit, or one reflected default.
        let resolved: Vec<ResourceSignatureDesc> = if signatures.is_empty() {
            vec![self.reflect_default_signature(name, shaders, pipeline_type, flags)?]
        } else {
            validate_signature_set(name, signatures)?;
            signatures.to_vec()
        };

        for desc in &resolved {
            let (sig_name, entry) = self.build_signature_entry(desc, pipeline_type, flags)?;
            self.check_merge(ResourceKind::Signature, &sig_name, &entry)?;
            pending
                .entries
                .push((ResourceKind::Signature, sig_name, entry));
        }

        let signature_refs: Vec<&ResourceSignatureDesc> = resolved.iter().collect();

        for device in flags.devices() {
            let backend = self.backend(device)?;
            let patched = backend.patch_shaders(shaders, &signature_refs, pipeline_type)?;

            if patched.len() != shaders.len() {
                return Err(ArchiverError::backend(
                    device,
                    format!(
                        "returned {} patched shaders for {} inputs of pipeline `{}`",
                        patched.len(),
                        shaders.len(),
                        name,
                    ),
                ));
            }

            pending.records[device.index()] = patched
                .into_iter()
                .map(|shader| encode_shader(&shader))
                .collect::<Result<_, _>>()?;
        }

        Ok(PipelineBaseData {
            name: name.to_owned(),
            pipeline_type,
            flags: pso_flags,
            resource_layout: resource_layout.clone(),
            signature_names: resolved.into_iter().map(|desc| desc.name).collect(),
        })
    }

    /// Reflects the default signature from every requested backend and checks
    /// they agree. The first backend's reflection defines the description.
    fn reflect_default_signature(
        &self,
        pipeline_name: &str,
        shaders: &[ShaderCreateInfo],
        pipeline_type: PipelineType,
        flags: DeviceFlags,
    ) -> Result<ResourceSignatureDesc, ArchiverError> {
        let mut result: Option<ResourceSignatureDesc> = None;

        for device in flags.devices() {
            let backend = self.backend(device)?;
            let mut reflected = backend.reflect_signature(shaders, pipeline_type)?;
            reflected.name.clear();
            reflected.binding_index = 0;

            match &result {
                None => result = Some(reflected),
                Some(first) => {
                    if *first != reflected {
                        return Err(ArchiverError::DefaultSignatureMismatch {
                            pipeline: pipeline_name.to_owned(),
                            device,
                        });
                    }
                }
            }
        }

        // `flags` is validated non-empty, so at least one backend ran.
        let mut desc = result.ok_or_else(|| {
            ArchiverError::invalid("device flags must select at least one backend")
        })?;
        desc.name = self.default_signature_name(pipeline_name, &desc, pipeline_type)?;

        Ok(desc)
    }

    /// Deterministic name for a synthesized default signature, with a numeric
    /// suffix when a different signature already owns the base name.
    fn default_signature_name(
        &self,
        pipeline_name: &str,
        desc: &ResourceSignatureDesc,
        pipeline_type: PipelineType,
    ) -> Result<String, ArchiverError> {
        let internal = SignatureInternalData::for_desc(desc, pipeline_type);
        let payload = encode_signature(desc, &internal)?;

        let base = format!("Default Signature of PSO '{}'", pipeline_name);
        let mut candidate = base.clone();
        let mut suffix = 1u32;

        while let Some(existing) = self.named[ResourceKind::Signature.index()].get(&candidate) {
            if existing.common == payload {
                break;
            }

            suffix += 1;
            candidate = format!("{} ({})", base, suffix);
        }

        Ok(candidate)
    }

    /// Builds the pipeline's own entry: common payload plus per-backend
    /// shader index lists, using the indices interning will assign.
    fn pipeline_entry(
        &self,
        common: SerializedData,
        pending: &PendingAdd,
        flags: DeviceFlags,
    ) -> ResourceEntry {
        let mut entry = ResourceEntry {
            common,
            device: Default::default(),
        };

        for device in flags.devices() {
            let device_index = device.index();
            let records = &pending.records[device_index];
            let shaders = &self.shaders[device_index];

            let mut next = shaders.list.len() as u32;
            let mut indices: Vec<u32> = Vec::with_capacity(records.len());

            for (position, record) in records.iter().enumerate() {
                let assigned = if let Some(&existing) = shaders.dedup.get(record) {
                    existing
                } else if let Some(earlier) =
                    records[..position].iter().position(|prior| prior == record)
                {
                    indices[earlier]
                } else {
                    let value = next;
                    next += 1;
                    value
                };

                indices.push(assigned);
            }

            entry.device[device_index] = Some(DeviceDatum::ShaderIndices(indices));
        }

        entry
    }

    /// Verifies that merging `candidate` under `name` cannot fail: same
    /// common bytes and no conflicting device data.
    fn check_merge(
        &self,
        kind: ResourceKind,
        name: &str,
        candidate: &ResourceEntry,
    ) -> Result<(), ArchiverError> {
        let Some(existing) = self.named[kind.index()].get(name) else {
            return Ok(());
        };

        if existing.common != candidate.common {
            return Err(ArchiverError::DuplicateName {
                kind,
                name: name.to_owned(),
            });
        }

        for (device_index, (old, new)) in
            existing.device.iter().zip(&candidate.device).enumerate()
        {
            if let (Some(old), Some(new)) = (old, new) {
                if old != new {
                    return Err(ArchiverError::ConflictingDeviceData {
                        kind,
                        name: name.to_owned(),
                        device: DeviceType::ALL[device_index],
                    });
                }
            }
        }

        Ok(())
    }

    /// Merges a pre-checked entry into the archiver. Infallible.
    fn apply_merge(&mut self, kind: ResourceKind, name: String, candidate: ResourceEntry) {
        use std::collections::btree_map::Entry;

        match self.named[kind.index()].entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
            Entry::Occupied(mut slot) => {
                debug!("{} `{}` re-added; merging device data", kind, slot.key());

                let existing = slot.get_mut();
                for (old, new) in existing.device.iter_mut().zip(candidate.device) {
                    if old.is_none() {
                        *old = new;
                    }
                }
            }
        }
    }

    /// Applies a fully checked pending add. Infallible.
    fn commit(&mut self, pending: PendingAdd) {
        for (device_index, records) in pending.records.into_iter().enumerate() {
            for record in records {
                self.shaders[device_index].intern(record);
            }
        }

        for (kind, name, entry) in pending.entries {
            self.apply_merge(kind, name, entry);
        }
    }

    // ----------------------------------------------------------- emission

    /// Serializes the collected resources into an archive.
    ///
    /// Emission is deterministic: the same sequence of `add_*` calls produces
    /// the same bytes. Named resources are written in name order; shader
    /// blobs keep the order they were first interned in, since pipelines
    /// reference them by index.
    pub fn serialize_to_vec(&self) -> Result<Vec<u8>, ArchiverError> {
        // Device blocks: shaders first, so each backend's region table sits
        // at the start of its block, then per-resource device data.
        let mut blocks: [Vec<u8>; DEVICE_TYPE_COUNT] = std::array::from_fn(|_| Vec::new());
        let mut shaders_header = None;

        if self.shaders.iter().any(|shaders| !shaders.list.is_empty()) {
            let mut header = DataHeader::new(ChunkType::Shaders);

            for (index, shaders) in self.shaders.iter().enumerate() {
                if shaders.list.is_empty() {
                    continue;
                }

                let block = &mut blocks[index];
                debug_assert!(block.is_empty());

                let table_size = shaders.list.len() * mem::size_of::<ArchiveRegion>();
                let mut regions = Vec::with_capacity(shaders.list.len());
                let mut offset = table_size as u32;

                for record in &shaders.list {
                    regions.push(ArchiveRegion::new(offset, record.len() as u32));
                    offset += record.len() as u32;
                }

                block.extend_from_slice(bytemuck::cast_slice(&regions));
                for record in &shaders.list {
                    block.extend_from_slice(record.as_bytes());
                }

                header.device_offset[index] = 0;
                header.device_size[index] = table_size as u32;
            }

            shaders_header = Some(header);
        }

        // Common data and name tables, in chunk type order then name order.
        let mut common: Vec<u8> = Vec::new();
        let mut named_chunks: Vec<(ChunkType, Vec<u8>, usize)> = Vec::new();

        for kind in ResourceKind::ALL {
            let map = &self.named[kind.index()];
            if map.is_empty() {
                continue;
            }

            let mut names = Vec::with_capacity(map.len());
            let mut sizes = Vec::with_capacity(map.len());
            let mut offsets = Vec::with_capacity(map.len());

            for (name, entry) in map {
                let mut data_header = DataHeader::new(kind.chunk_type());

                for (index, datum) in entry.device.iter().enumerate() {
                    let Some(datum) = datum else { continue };

                    let encoded = encode_device_datum(datum)?;
                    if encoded.is_empty() {
                        continue;
                    }

                    data_header.device_offset[index] = blocks[index].len() as u32;
                    data_header.device_size[index] = encoded.len() as u32;
                    blocks[index].extend_from_slice(&encoded);
                }

                let offset = common.len() as u32;

                if kind == ResourceKind::RenderPass {
                    let rp_header = RpDataHeader {
                        chunk_type: ChunkType::RenderPass as u32,
                        _pad: 0,
                    };
                    common.extend_from_slice(bytemuck::bytes_of(&rp_header));
                } else {
                    common.extend_from_slice(bytemuck::bytes_of(&data_header));
                }

                common.extend_from_slice(entry.common.as_bytes());

                names.push(name.as_str());
                offsets.push(offset);
                sizes.push(common.len() as u32 - offset);
            }

            let (payload, offsets_pos) = build_named_table(&names, &sizes, &offsets);
            named_chunks.push((kind.chunk_type(), payload, offsets_pos));
        }

        // Chunk payloads in chunk type order.
        let mut debug_info = ArchiveDebugInfo {
            api_version: if self.device.info().api_version != 0 {
                self.device.info().api_version
            } else {
                API_VERSION
            },
            git_hash: self.device.info().git_hash.clone().unwrap_or_default(),
        };

        let mut chunks: Vec<(ChunkType, Vec<u8>, Option<usize>)> = Vec::new();
        chunks.push((
            ChunkType::ArchiveDebugInfo,
            encode_debug_info(&mut debug_info)?,
            None,
        ));

        for (chunk_type, payload, offsets_pos) in named_chunks {
            chunks.push((chunk_type, payload, Some(offsets_pos)));
        }

        if let Some(header) = &shaders_header {
            chunks.push((ChunkType::Shaders, bytemuck::bytes_of(header).to_vec(), None));
        }

        // Layout: header, chunk directory, payloads, common data, blocks.
        let header_size = mem::size_of::<ArchiveHeader>();
        let directory_size = chunks.len() * mem::size_of::<ChunkHeader>();

        let mut offset = header_size + directory_size;
        let mut chunk_headers = Vec::with_capacity(chunks.len());

        for (chunk_type, payload, _) in &chunks {
            chunk_headers.push(ChunkHeader {
                chunk_type: *chunk_type as u32,
                size: payload.len() as u32,
                offset: offset as u32,
                _pad: 0,
            });
            offset += payload.len();
        }

        let common_base = offset;
        offset += common.len();

        let mut header = ArchiveHeader {
            magic: ARCHIVE_MAGIC,
            version: ARCHIVE_VERSION,
            block_base_offsets: [INVALID_OFFSET; DEVICE_TYPE_COUNT],
            num_chunks: chunks.len() as u32,
            _pad: 0,
        };

        for (index, block) in blocks.iter().enumerate() {
            if !block.is_empty() {
                header.block_base_offsets[index] = offset as u32;
                offset += block.len();
            }
        }

        let total_size = offset as u64;
        if total_size > u64::from(u32::MAX) {
            return Err(ArchiverError::ArchiveTooLarge { size: total_size });
        }

        // Patch the name tables' data offsets from common-relative to
        // absolute.
        for (_, payload, offsets_pos) in &mut chunks {
            let Some(offsets_pos) = *offsets_pos else { continue };

            let header: NamedResourceArrayHeader = bytemuck::pod_read_unaligned(
                &payload[..mem::size_of::<NamedResourceArrayHeader>()],
            );

            for i in 0..header.count as usize {
                let pos = offsets_pos + i * mem::size_of::<u32>();
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&payload[pos..pos + 4]);
                let patched = u32::from_ne_bytes(bytes) + common_base as u32;
                payload[pos..pos + 4].copy_from_slice(&patched.to_ne_bytes());
            }
        }

        // Assemble.
        let mut archive = Vec::with_capacity(total_size as usize);
        archive.extend_from_slice(bytemuck::bytes_of(&header));
        archive.extend_from_slice(bytemuck::cast_slice(&chunk_headers));
        for (_, payload, _) in &chunks {
            archive.extend_from_slice(payload);
        }
        archive.extend_from_slice(&common);
        for block in &blocks {
            archive.extend_from_slice(block);
        }

        debug_assert_eq!(archive.len(), total_size as usize);

        Ok(archive)
    }

    /// Serializes the collected resources and writes them to `writer`.
    pub fn serialize_to_stream<W: io::Write>(&self, writer: &mut W) -> Result<(), ArchiverError> {
        let bytes = self.serialize_to_vec()?;
        writer.write_all(&bytes)?;

        Ok(())
    }
}

// ------------------------------------------------------------- free helpers

fn validate_name(kind: ResourceKind, name: &str) -> Result<(), ArchiverError> {
    if name.is_empty() {
        return Err(ArchiverError::invalid(format!("{} name must not be empty", kind)));
    }

    Ok(())
}

/// Determines graphics vs mesh from the shader stages and validates them.
fn graphics_pipeline_type(
    name: &str,
    shaders: &[ShaderCreateInfo],
) -> Result<PipelineType, ArchiverError> {
    let mut stages = ShaderStages::empty();

    for shader in shaders {
        let stage = shader.desc.shader_type;

        if !stage.is_single_stage() || !ShaderStages::ALL_GRAPHICS.contains(stage) {
            return Err(ArchiverError::invalid(format!(
                "shader `{}` of pipeline `{}` must have exactly one graphics stage",
                shader.desc.name, name,
            )));
        }

        if stages.intersects(stage) {
            return Err(ArchiverError::invalid(format!(
                "pipeline `{}` has multiple shaders for one stage",
                name,
            )));
        }

        stages |= stage;
    }

    let mesh_stages = ShaderStages::AMPLIFICATION | ShaderStages::MESH;
    let vertex_stages = ShaderStages::VERTEX
        | ShaderStages::GEOMETRY
        | ShaderStages::HULL
        | ShaderStages::DOMAIN;

    if stages.intersects(mesh_stages) {
        if stages.intersects(vertex_stages) {
            return Err(ArchiverError::invalid(format!(
                "pipeline `{}` mixes mesh and vertex processing stages",
                name,
            )));
        }

        Ok(PipelineType::Mesh)
    } else if stages.intersects(ShaderStages::VERTEX) {
        Ok(PipelineType::Graphics)
    } else {
        Err(ArchiverError::invalid(format!(
            "pipeline `{}` has neither a vertex nor a mesh shader",
            name,
        )))
    }
}

/// Validates an explicit signature set: size, names, unique binding slots.
fn validate_signature_set(
    pipeline_name: &str,
    signatures: &[ResourceSignatureDesc],
) -> Result<(), ArchiverError> {
    if signatures.len() > MAX_RESOURCE_SIGNATURES {
        return Err(ArchiverError::invalid(format!(
            "pipeline `{}` uses {} signatures, the maximum is {}",
            pipeline_name,
            signatures.len(),
            MAX_RESOURCE_SIGNATURES,
        )));
    }

    let mut used_slots = 0u16;

    for desc in signatures {
        validate_name(ResourceKind::Signature, &desc.name)?;

        if usize::from(desc.binding_index) >= MAX_RESOURCE_SIGNATURES {
            return Err(ArchiverError::invalid(format!(
                "signature `{}` has binding index {}, the maximum is {}",
                desc.name,
                desc.binding_index,
                MAX_RESOURCE_SIGNATURES - 1,
            )));
        }

        let bit = 1u16 << desc.binding_index;
        if used_slots & bit != 0 {
            return Err(ArchiverError::invalid(format!(
                "pipeline `{}` binds two signatures to slot {}",
                pipeline_name, desc.binding_index,
            )));
        }
        used_slots |= bit;
    }

    Ok(())
}

fn validate_ray_tracing_groups(info: &RayTracingPipelineCreateInfo) -> Result<(), ArchiverError> {
    let pool_size = info.shaders.len() as u32;
    let mut group_names = std::collections::BTreeSet::new();

    let mut check_name = |group_name: &str| -> Result<(), ArchiverError> {
        if group_name.is_empty() {
            return Err(ArchiverError::invalid(format!(
                "ray tracing pipeline `{}` has a shader group without a name",
                info.name,
            )));
        }

        if !group_names.insert(group_name.to_owned()) {
            return Err(ArchiverError::invalid(format!(
                "ray tracing pipeline `{}` has two shader groups named `{}`",
                info.name, group_name,
            )));
        }

        Ok(())
    };

    let check_index = |index: u32, required: bool| -> Result<(), ArchiverError> {
        if index == SHADER_UNUSED {
            if required {
                return Err(ArchiverError::invalid(format!(
                    "ray tracing pipeline `{}` has a general group without a shader",
                    info.name,
                )));
            }

            return Ok(());
        }

        if index >= pool_size {
            return Err(ArchiverError::invalid(format!(
                "ray tracing pipeline `{}` references shader index {} but has only {} shaders",
                info.name, index, pool_size,
            )));
        }

        Ok(())
    };

    for group in &info.ray_tracing.general_shaders {
        check_name(&group.name)?;
        check_index(group.shader_index, true)?;
    }

    for group in &info.ray_tracing.triangle_hit_shaders {
        check_name(&group.name)?;
        check_index(group.closest_hit_shader_index, false)?;
        check_index(group.any_hit_shader_index, false)?;
    }

    for group in &info.ray_tracing.procedural_hit_shaders {
        check_name(&group.name)?;
        check_index(group.intersection_shader_index, false)?;
        check_index(group.closest_hit_shader_index, false)?;
        check_index(group.any_hit_shader_index, false)?;
    }

    Ok(())
}

fn encode_signature(
    desc: &ResourceSignatureDesc,
    internal: &SignatureInternalData,
) -> Result<SerializedData, SerializeError> {
    let mut desc = desc.clone();
    let mut internal = internal.clone();

    Ok(serialize_to_data!(|ser| schema::signature(
        ser,
        &mut desc,
        &mut internal
    )))
}

fn encode_render_pass(desc: &RenderPassDesc) -> Result<SerializedData, SerializeError> {
    let mut desc = desc.clone();

    Ok(serialize_to_data!(|ser| schema::render_pass(ser, &mut desc)))
}

fn encode_shader(shader: &CompiledShader) -> Result<SerializedData, SerializeError> {
    let mut shader = shader.clone();

    Ok(serialize_to_data!(|ser| schema::compiled_shader(
        ser,
        &mut shader
    )))
}

fn encode_debug_info(info: &mut ArchiveDebugInfo) -> Result<Vec<u8>, SerializeError> {
    let data = serialize_to_data!(|ser| schema::debug_info(ser, info));

    Ok(data.as_bytes().to_vec())
}

// Pipeline common payloads are the base data followed by the kind-specific
// description; compute pipelines have no description of their own.

fn encode_graphics_common(
    base: &mut PipelineBaseData,
    desc: &mut GraphicsPipelineDesc,
) -> Result<SerializedData, SerializeError> {
    Ok(serialize_to_data!(|ser| {
        schema::pipeline_base(ser, base)?;
        schema::graphics_pipeline(ser, desc)
    }))
}

fn encode_compute_common(base: &mut PipelineBaseData) -> Result<SerializedData, SerializeError> {
    Ok(serialize_to_data!(|ser| schema::pipeline_base(ser, base)))
}

fn encode_tile_common(
    base: &mut PipelineBaseData,
    desc: &mut TilePipelineDesc,
) -> Result<SerializedData, SerializeError> {
    Ok(serialize_to_data!(|ser| {
        schema::pipeline_base(ser, base)?;
        schema::tile_pipeline(ser, desc)
    }))
}

fn encode_ray_tracing_common(
    base: &mut PipelineBaseData,
    desc: &mut RayTracingPipelineDesc,
) -> Result<SerializedData, SerializeError> {
    Ok(serialize_to_data!(|ser| {
        schema::pipeline_base(ser, base)?;
        schema::ray_tracing_pipeline(ser, desc)
    }))
}

fn encode_device_datum(datum: &DeviceDatum) -> Result<Vec<u8>, SerializeError> {
    match datum {
        DeviceDatum::Blob(data) => Ok(data.as_bytes().to_vec()),
        DeviceDatum::ShaderIndices(indices) => {
            let mut indices = indices.clone();
            let data = serialize_to_data!(|ser| schema::shader_indices(ser, &mut indices));

            Ok(data.as_bytes().to_vec())
        }
    }
}

/// Builds a named resource table payload. Returns the payload and the byte
/// position of the data offset array, which emission patches to absolute
/// offsets.
fn build_named_table(names: &[&str], sizes: &[u32], offsets: &[u32]) -> (Vec<u8>, usize) {
    let count = names.len();
    let header = NamedResourceArrayHeader {
        count: count as u32,
        _pad: 0,
    };

    let names_size: usize = names.iter().map(|name| name.len() + 1).sum();
    let mut payload = Vec::with_capacity(
        mem::size_of::<NamedResourceArrayHeader>() + 3 * 4 * count + names_size,
    );

    payload.extend_from_slice(bytemuck::bytes_of(&header));

    for name in names {
        payload.extend_from_slice(&((name.len() as u32 + 1).to_ne_bytes()));
    }
    for size in sizes {
        payload.extend_from_slice(&size.to_ne_bytes());
    }

    let offsets_pos = payload.len();
    for offset in offsets {
        payload.extend_from_slice(&offset.to_ne_bytes());
    }

    for name in names {
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
    }

    (payload, offsets_pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderDesc;

    fn shader(name: &str, stage: ShaderStages) -> ShaderCreateInfo {
        ShaderCreateInfo {
            desc: ShaderDesc {
                name: name.to_owned(),
                shader_type: stage,
            },
            ..Default::default()
        }
    }

    #[test]
    fn graphics_stages_select_pipeline_type() {
        let vertex_pixel = [
            shader("vs", ShaderStages::VERTEX),
            shader("ps", ShaderStages::PIXEL),
        ];
        assert_eq!(
            graphics_pipeline_type("pso", &vertex_pixel).unwrap(),
            PipelineType::Graphics,
        );

        let mesh = [
            shader("ms", ShaderStages::MESH),
            shader("ps", ShaderStages::PIXEL),
        ];
        assert_eq!(graphics_pipeline_type("pso", &mesh).unwrap(), PipelineType::Mesh);
    }

    #[test]
    fn graphics_stages_reject_mixed_and_duplicate() {
        let mixed = [
            shader("vs", ShaderStages::VERTEX),
            shader("ms", ShaderStages::MESH),
        ];
        assert!(graphics_pipeline_type("pso", &mixed).is_err());

        let duplicate = [
            shader("vs1", ShaderStages::VERTEX),
            shader("vs2", ShaderStages::VERTEX),
        ];
        assert!(graphics_pipeline_type("pso", &duplicate).is_err());

        let pixel_only = [shader("ps", ShaderStages::PIXEL)];
        assert!(graphics_pipeline_type("pso", &pixel_only).is_err());
    }

    #[test]
    fn signature_set_rejects_slot_collisions() {
        let mut a = ResourceSignatureDesc {
            name: "A".to_owned(),
            ..Default::default()
        };
        let mut b = ResourceSignatureDesc {
            name: "B".to_owned(),
            ..Default::default()
        };

        a.binding_index = 1;
        b.binding_index = 1;
        assert!(validate_signature_set("pso", &[a.clone(), b.clone()]).is_err());

        b.binding_index = 2;
        assert!(validate_signature_set("pso", &[a, b]).is_ok());
    }

    #[test]
    fn ray_tracing_group_validation() {
        use crate::pipeline::ray_tracing::RayTracingGeneralShaderGroup;

        let mut info = RayTracingPipelineCreateInfo {
            name: "rt".to_owned(),
            shaders: vec![shader("gen", ShaderStages::RAY_GEN)],
            ..Default::default()
        };
        info.ray_tracing.general_shaders = vec![RayTracingGeneralShaderGroup {
            name: "Main".to_owned(),
            shader_index: 0,
        }];
        assert!(validate_ray_tracing_groups(&info).is_ok());

        info.ray_tracing.general_shaders[0].shader_index = 1;
        assert!(validate_ray_tracing_groups(&info).is_err());

        info.ray_tracing.general_shaders[0].shader_index = SHADER_UNUSED;
        assert!(validate_ray_tracing_groups(&info).is_err());
    }

    #[test]
    fn named_table_layout() {
        let (payload, offsets_pos) = build_named_table(&["A", "Long"], &[10, 20], &[0, 10]);

        // Header, three u32 arrays of two entries, packed names.
        assert_eq!(offsets_pos, 8 + 8 + 8);
        assert_eq!(payload.len(), 8 + 3 * 8 + 2 + 5);

        let name_len_0 = u32::from_ne_bytes(payload[8..12].try_into().unwrap());
        let name_len_1 = u32::from_ne_bytes(payload[12..16].try_into().unwrap());
        assert_eq!((name_len_0, name_len_1), (2, 5));

        assert_eq!(&payload[32..], b"A\0Long\0");
    }

    #[test]
    fn shader_indices_deduplicate_within_one_pipeline() {
        let mut shaders = DeviceShaders::default();
        let first = shaders.intern(SerializedData::from(vec![1, 2, 3]));
        let second = shaders.intern(SerializedData::from(vec![4, 5]));
        let again = shaders.intern(SerializedData::from(vec![1, 2, 3]));

        assert_eq!((first, second, again), (0, 1, 0));
        assert_eq!(shaders.list.len(), 2);
    }
}
