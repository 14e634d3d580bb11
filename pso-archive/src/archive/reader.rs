// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Reading archives.
//!
//! [`DeviceObjectArchive`] validates the archive structure once at
//! construction and then serves lazy, per-resource loads. Structural damage
//! fails construction; a missing or out-of-range device data range for an
//! individual resource is logged and treated as "no data for this backend",
//! matching the behavior of runtime loaders that fall back to recompilation.

use std::{mem, sync::Arc};

use std::collections::BTreeMap;

use bytemuck::Pod;
use log::error;

use crate::{
    device::{DeviceType, DEVICE_TYPE_COUNT},
    pipeline::{
        GraphicsPipelineDesc, PipelineStateData, RayTracingPipelineDesc, TilePipelineDesc,
    },
    render_pass::RenderPassDesc,
    serializer::{Reader, SerializedData, Serializer},
    shader::CompiledShader,
    signature::{ResourceSignatureDesc, SignatureInternalData},
};

use super::{
    schema, ArchiveError, ArchiveHeader, ArchiveRegion, ArchiveSource, ChunkHeader, ChunkType,
    DataHeader, NamedResourceArrayHeader, ResourceKind, RpDataHeader, ARCHIVE_MAGIC,
    ARCHIVE_VERSION, CHUNK_TYPE_COUNT, INVALID_OFFSET, RESOURCE_KIND_COUNT,
};

/// Provenance information stored in the debug info chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveDebugInfo {
    /// Engine API version the archive was produced with.
    pub api_version: u32,
    /// Git hash of the producing build, empty when unknown.
    pub git_hash: String,
}

fn read_pod_at<T: Pod>(
    source: &dyn ArchiveSource,
    offset: u64,
    value: &mut T,
) -> Result<(), ArchiveError> {
    source.read_at(offset, bytemuck::bytes_of_mut(value))?;
    Ok(())
}

/// Parsed structural index of an archive: chunk directory, name-to-region
/// maps and the shaders data header.
///
/// Shared by the reader and the repacker.
#[derive(Debug, Default)]
pub(crate) struct ArchiveIndex {
    pub base_offsets: [u32; DEVICE_TYPE_COUNT],
    pub chunks: Vec<ChunkHeader>,
    /// Name-to-common-data-region maps, indexed by [`ResourceKind`].
    pub resources: [BTreeMap<String, ArchiveRegion>; RESOURCE_KIND_COUNT],
    /// Data header of the shaders chunk, if the archive stores shaders.
    pub shaders: Option<DataHeader>,
    pub debug_info: ArchiveDebugInfo,
}

impl ArchiveIndex {
    pub(crate) fn read(source: &dyn ArchiveSource) -> Result<Self, ArchiveError> {
        let file_size = source.len();

        let mut header = ArchiveHeader::zeroed_header();
        read_pod_at(source, 0, &mut header)?;

        if header.magic != ARCHIVE_MAGIC {
            return Err(ArchiveError::InvalidMagic {
                found: header.magic,
            });
        }

        if header.version != ARCHIVE_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                found: header.version,
            });
        }

        for (device, &base) in DeviceType::ALL.iter().zip(&header.block_base_offsets) {
            if base != INVALID_OFFSET && u64::from(base) > file_size {
                return Err(ArchiveError::Corrupt {
                    detail: format!(
                        "{} block base offset {} exceeds file size {}",
                        device, base, file_size,
                    ),
                });
            }
        }

        let chunks_offset = mem::size_of::<ArchiveHeader>() as u64;
        let chunks_size = u64::from(header.num_chunks) * mem::size_of::<ChunkHeader>() as u64;

        if chunks_offset + chunks_size > file_size {
            return Err(ArchiveError::Corrupt {
                detail: format!(
                    "chunk directory of {} entries does not fit the file",
                    header.num_chunks,
                ),
            });
        }

        let mut chunks = vec![ChunkHeader::zeroed_header(); header.num_chunks as usize];
        source.read_at(chunks_offset, bytemuck::cast_slice_mut(&mut chunks))?;

        let mut index = Self {
            base_offsets: header.block_base_offsets,
            ..Default::default()
        };
        let mut seen = [false; CHUNK_TYPE_COUNT];

        for chunk in &chunks {
            let chunk_type = ChunkType::from_u32(chunk.chunk_type).ok_or_else(|| {
                ArchiveError::Corrupt {
                    detail: format!("unknown chunk type {:#x}", chunk.chunk_type),
                }
            })?;

            if chunk_type == ChunkType::Undefined {
                return Err(ArchiveError::Corrupt {
                    detail: "undefined chunk type in chunk directory".to_owned(),
                });
            }

            if mem::replace(&mut seen[chunk_type as usize], true) {
                return Err(ArchiveError::Corrupt {
                    detail: format!("duplicate chunk of type {:?}", chunk_type),
                });
            }

            let end = u64::from(chunk.offset) + u64::from(chunk.size);
            if end > file_size {
                return Err(ArchiveError::Corrupt {
                    detail: format!(
                        "chunk {:?} [{}, {}) exceeds file size {}",
                        chunk_type, chunk.offset, end, file_size,
                    ),
                });
            }

            let mut payload = vec![0u8; chunk.size as usize];
            source.read_at(u64::from(chunk.offset), &mut payload)?;

            match chunk_type {
                ChunkType::ArchiveDebugInfo => {
                    let mut reader = Reader::new(&payload);
                    schema::debug_info(&mut reader, &mut index.debug_info)?;
                }
                ChunkType::Shaders => {
                    if payload.len() != mem::size_of::<DataHeader>() {
                        return Err(ArchiveError::Corrupt {
                            detail: format!(
                                "shaders chunk payload is {} bytes, expected {}",
                                payload.len(),
                                mem::size_of::<DataHeader>(),
                            ),
                        });
                    }

                    let shaders: DataHeader = bytemuck::pod_read_unaligned(&payload);
                    if shaders.chunk_type != ChunkType::Shaders as u32 {
                        return Err(ArchiveError::WrongDataType {
                            expected: ChunkType::Shaders,
                            found: shaders.chunk_type,
                        });
                    }

                    index.shaders = Some(shaders);
                }
                _ => {
                    // Every remaining chunk type is a named resource table;
                    // `Undefined` was rejected above.
                    if let Some(kind) = ResourceKind::from_chunk_type(chunk_type) {
                        read_named_resources(
                            &payload,
                            kind,
                            file_size,
                            &mut index.resources[kind.index()],
                        )?;
                    }
                }
            }
        }

        index.chunks = chunks;

        Ok(index)
    }
}

fn read_named_resources(
    payload: &[u8],
    kind: ResourceKind,
    file_size: u64,
    map: &mut BTreeMap<String, ArchiveRegion>,
) -> Result<(), ArchiveError> {
    let mut reader = Reader::new(payload);

    let mut header = NamedResourceArrayHeader::zeroed_header();
    reader.pod(&mut header)?;
    let count = header.count as usize;

    let name_lens: Vec<u32> = read_u32_array(&mut reader, count)?;
    let data_sizes: Vec<u32> = read_u32_array(&mut reader, count)?;
    let data_offsets: Vec<u32> = read_u32_array(&mut reader, count)?;

    for i in 0..count {
        let name_len = name_lens[i] as usize;
        let name_bytes = reader.bytes(name_len)?;

        let name = match name_bytes.split_last() {
            Some((0, payload)) => std::str::from_utf8(payload).map_err(|_| {
                ArchiveError::Corrupt {
                    detail: format!("{} name table entry is not valid UTF-8", kind),
                }
            })?,
            _ => {
                return Err(ArchiveError::Corrupt {
                    detail: format!("{} name table entry is not NUL-terminated", kind),
                });
            }
        };

        let region = ArchiveRegion::new(data_offsets[i], data_sizes[i]);

        if region.offset == INVALID_OFFSET || region.end() > file_size {
            return Err(ArchiveError::Corrupt {
                detail: format!(
                    "common data of {} `{}` [{}, {}) exceeds file size {}",
                    kind,
                    name,
                    region.offset,
                    region.end(),
                    file_size,
                ),
            });
        }

        if map.insert(name.to_owned(), region).is_some() {
            return Err(ArchiveError::Corrupt {
                detail: format!("duplicate {} `{}`", kind, name),
            });
        }
    }

    Ok(())
}

fn read_u32_array(reader: &mut Reader<'_>, count: usize) -> Result<Vec<u32>, ArchiveError> {
    let mut values = vec![0u32; count];

    for value in &mut values {
        reader.pod(value)?;
    }

    Ok(values)
}

// bytemuck::Zeroable::zeroed() needs a type annotation at every call site;
// these constructors keep the parsing code readable.
impl ArchiveHeader {
    fn zeroed_header() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

impl ChunkHeader {
    fn zeroed_header() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

impl NamedResourceArrayHeader {
    fn zeroed_header() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// A parsed archive serving lazy resource loads.
///
/// The structural index is built once in [`new`](Self::new); individual
/// resources are deserialized on demand. All methods take `&self`, so one
/// archive can serve concurrent loaders.
pub struct DeviceObjectArchive {
    source: Arc<dyn ArchiveSource>,
    index: ArchiveIndex,
}

impl DeviceObjectArchive {
    /// Parses and validates the archive structure.
    pub fn new(source: Arc<dyn ArchiveSource>) -> Result<Self, ArchiveError> {
        let index = ArchiveIndex::read(source.as_ref())?;

        Ok(Self { source, index })
    }

    /// Convenience constructor for in-memory archives.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ArchiveError> {
        Self::new(Arc::new(bytes))
    }

    pub fn debug_info(&self) -> &ArchiveDebugInfo {
        &self.index.debug_info
    }

    /// Names of all resources of a kind, in sorted order.
    pub fn resource_names(&self, kind: ResourceKind) -> impl Iterator<Item = &str> {
        self.index.resources[kind.index()].keys().map(String::as_str)
    }

    pub fn resource_count(&self, kind: ResourceKind) -> usize {
        self.index.resources[kind.index()].len()
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.index.resources[kind.index()].contains_key(name)
    }

    fn region(&self, kind: ResourceKind, name: &str) -> Result<ArchiveRegion, ArchiveError> {
        self.index.resources[kind.index()]
            .get(name)
            .copied()
            .ok_or_else(|| ArchiveError::ResourceNotFound {
                kind,
                name: name.to_owned(),
            })
    }

    fn read_region(&self, region: ArchiveRegion) -> Result<Vec<u8>, ArchiveError> {
        let mut bytes = vec![0u8; region.size as usize];
        self.source.read_at(u64::from(region.offset), &mut bytes)?;

        Ok(bytes)
    }

    /// Reads the common data of a resource whose payload starts with a
    /// [`DataHeader`], returning the header and a reader over the rest.
    fn read_with_data_header(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<(DataHeader, Vec<u8>), ArchiveError> {
        let region = self.region(kind, name)?;
        let bytes = self.read_region(region)?;

        let mut reader = Reader::new(&bytes);
        let mut header = DataHeader::new(ChunkType::Undefined);
        reader.pod(&mut header)?;

        if header.chunk_type != kind.chunk_type() as u32 {
            return Err(ArchiveError::WrongDataType {
                expected: kind.chunk_type(),
                found: header.chunk_type,
            });
        }

        let payload = bytes[reader.position()..].to_vec();

        Ok((header, payload))
    }

    /// Loads a resource signature with its internal data and device data
    /// directory.
    pub fn load_signature(
        &self,
        name: &str,
    ) -> Result<(ResourceSignatureDesc, SignatureInternalData, DataHeader), ArchiveError> {
        let (header, payload) = self.read_with_data_header(ResourceKind::Signature, name)?;

        let mut desc = ResourceSignatureDesc::default();
        let mut internal = SignatureInternalData::default();
        let mut reader = Reader::new(&payload);
        schema::signature(&mut reader, &mut desc, &mut internal)?;

        desc.name = name.to_owned();

        Ok((desc, internal, header))
    }

    pub fn load_render_pass(&self, name: &str) -> Result<RenderPassDesc, ArchiveError> {
        let region = self.region(ResourceKind::RenderPass, name)?;
        let bytes = self.read_region(region)?;

        let mut reader = Reader::new(&bytes);
        let mut header = RpDataHeader {
            chunk_type: 0,
            _pad: 0,
        };
        reader.pod(&mut header)?;

        if header.chunk_type != ChunkType::RenderPass as u32 {
            return Err(ArchiveError::WrongDataType {
                expected: ChunkType::RenderPass,
                found: header.chunk_type,
            });
        }

        let mut desc = RenderPassDesc::default();
        schema::render_pass(&mut reader, &mut desc)?;
        desc.name = name.to_owned();

        Ok(desc)
    }

    fn load_pipeline<T: Default>(
        &self,
        kind: ResourceKind,
        name: &str,
        desc_schema: impl FnOnce(&mut Reader<'_>, &mut T) -> Result<(), crate::serializer::SerializeError>,
    ) -> Result<(PipelineStateData<T>, DataHeader), ArchiveError> {
        let (header, payload) = self.read_with_data_header(kind, name)?;

        let mut data = PipelineStateData::<T>::default();
        let mut reader = Reader::new(&payload);
        schema::pipeline_base(&mut reader, &mut data.base)?;
        desc_schema(&mut reader, &mut data.desc)?;

        data.base.name = name.to_owned();

        Ok((data, header))
    }

    pub fn load_graphics_pipeline(
        &self,
        name: &str,
    ) -> Result<(PipelineStateData<GraphicsPipelineDesc>, DataHeader), ArchiveError> {
        // Closures rather than the fn items, so the schema instantiates for
        // the local buffer lifetime.
        self.load_pipeline(ResourceKind::GraphicsPipeline, name, |reader, desc| {
            schema::graphics_pipeline(reader, desc)
        })
    }

    pub fn load_compute_pipeline(
        &self,
        name: &str,
    ) -> Result<(PipelineStateData<()>, DataHeader), ArchiveError> {
        self.load_pipeline(ResourceKind::ComputePipeline, name, |_, _| Ok(()))
    }

    pub fn load_tile_pipeline(
        &self,
        name: &str,
    ) -> Result<(PipelineStateData<TilePipelineDesc>, DataHeader), ArchiveError> {
        self.load_pipeline(ResourceKind::TilePipeline, name, |reader, desc| {
            schema::tile_pipeline(reader, desc)
        })
    }

    pub fn load_ray_tracing_pipeline(
        &self,
        name: &str,
    ) -> Result<(PipelineStateData<RayTracingPipelineDesc>, DataHeader), ArchiveError> {
        self.load_pipeline(ResourceKind::RayTracingPipeline, name, |reader, desc| {
            schema::ray_tracing_pipeline(reader, desc)
        })
    }

    /// Returns a resource's device-specific data for one backend.
    ///
    /// Absent data yields an empty blob. An out-of-range data range is a
    /// producer bug or damaged file, but is deliberately non-fatal: it is
    /// logged and treated as absent so a loader can fall back to compiling
    /// from source.
    pub fn device_data(&self, header: &DataHeader, device: DeviceType) -> SerializedData {
        let index = device.index();

        if !header.has_device_data(index) {
            return SerializedData::default();
        }

        let base = self.index.base_offsets[index];
        if base == INVALID_OFFSET {
            error!(
                "archive has no {} data block, but a resource references it",
                device,
            );
            return SerializedData::default();
        }

        let offset = u64::from(base) + u64::from(header.device_offset[index]);
        let size = header.device_size[index] as usize;

        // A block runs to the next present block's base, or to the end of the
        // archive for the last one. A range that bleeds past that would read
        // another backend's bytes.
        let block_end = self
            .index
            .base_offsets
            .iter()
            .filter(|&&other| other != INVALID_OFFSET && other > base)
            .map(|&other| u64::from(other))
            .min()
            .unwrap_or_else(|| self.source.len());

        if offset + size as u64 > block_end {
            error!(
                "{} data range [{}, {}) exceeds its block end {}; ignoring it",
                device,
                offset,
                offset + size as u64,
                block_end,
            );
            return SerializedData::default();
        }

        let mut bytes = vec![0u8; size];
        if let Err(err) = self.source.read_at(offset, &mut bytes) {
            error!("failed to read {} data for a resource: {}", device, err);
            return SerializedData::default();
        }

        SerializedData::new(bytes)
    }

    /// Returns the shader region table of one backend, empty when the backend
    /// has no shaders in this archive.
    pub fn shader_regions(&self, device: DeviceType) -> Result<Vec<ArchiveRegion>, ArchiveError> {
        let Some(shaders) = &self.index.shaders else {
            return Ok(Vec::new());
        };

        let table = self.device_data(shaders, device);
        let bytes = table.as_bytes();

        if bytes.len() % mem::size_of::<ArchiveRegion>() != 0 {
            return Err(ArchiveError::Corrupt {
                detail: format!(
                    "{} shader region table size {} is not a multiple of {}",
                    device,
                    bytes.len(),
                    mem::size_of::<ArchiveRegion>(),
                ),
            });
        }

        Ok(bytes
            .chunks_exact(mem::size_of::<ArchiveRegion>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Loads one shader of a backend's shader list by dense index.
    pub fn load_shader(
        &self,
        device: DeviceType,
        regions: &[ArchiveRegion],
        index: u32,
    ) -> Result<CompiledShader, ArchiveError> {
        let region = regions.get(index as usize).ok_or_else(|| ArchiveError::Corrupt {
            detail: format!(
                "shader index {} out of range for {} ({} shaders archived)",
                index,
                device,
                regions.len(),
            ),
        })?;

        let base = self.index.base_offsets[device.index()];
        if base == INVALID_OFFSET {
            return Err(ArchiveError::Corrupt {
                detail: format!("archive has no {} data block", device),
            });
        }

        let offset = u64::from(base) + u64::from(region.offset);
        let mut bytes = vec![0u8; region.size as usize];
        self.source.read_at(offset, &mut bytes)?;

        let mut shader = CompiledShader::default();
        let mut reader = Reader::new(&bytes);
        schema::compiled_shader(&mut reader, &mut shader)?;

        Ok(shader)
    }
}
