// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Offline archive surgery.
//!
//! [`ArchiveRepacker`] removes one backend's data block from an archive, or
//! transplants a block from another archive with matching content. Unlike the
//! read path, consistency violations here are hard errors: repacking is an
//! explicit offline operation where aborting is correct.

use std::{error::Error, fmt, io, mem};

use log::info;

use crate::device::{DeviceType, DEVICE_TYPE_COUNT};

use super::{
    reader::ArchiveIndex, ArchiveError, ArchiveHeader, ArchiveRegion, ArchiveSource, ChunkHeader,
    ChunkType, DataHeader, ResourceKind, ARCHIVE_MAGIC, ARCHIVE_VERSION, INVALID_OFFSET,
};

/// Error type for repacking operations.
#[derive(Debug)]
pub enum RepackError {
    /// The archive has no data block for the backend.
    NoDeviceData { device: DeviceType },
    /// The destination archive already has a data block for the backend.
    DeviceDataPresent { device: DeviceType },
    /// The source archive has a resource the destination lacks.
    MissingResource { kind: ResourceKind, name: String },
    /// A resource's common data differs between the two archives.
    ContentMismatch { kind: ResourceKind, name: String },
    /// The source and destination disagree on whether shaders are archived.
    ShaderChunkMismatch,
    /// The combined archive would exceed the 32-bit offset range.
    ArchiveTooLarge { size: u64 },
    Archive(ArchiveError),
    Io(io::Error),
}

impl fmt::Display for RepackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDeviceData { device } => {
                write!(f, "archive has no {} data block", device)
            }
            Self::DeviceDataPresent { device } => {
                write!(f, "destination archive already has a {} data block", device)
            }
            Self::MissingResource { kind, name } => {
                write!(
                    f,
                    "destination archive does not contain {} `{}`",
                    kind, name,
                )
            }
            Self::ContentMismatch { kind, name } => {
                write!(
                    f,
                    "common data of {} `{}` differs between the archives",
                    kind, name,
                )
            }
            Self::ShaderChunkMismatch => {
                write!(f, "only one of the archives has a shaders chunk")
            }
            Self::ArchiveTooLarge { size } => {
                write!(f, "archive size {} exceeds the 32-bit offset range", size)
            }
            Self::Archive(err) => write!(f, "{}", err),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl Error for RepackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Archive(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ArchiveError> for RepackError {
    fn from(err: ArchiveError) -> Self {
        Self::Archive(err)
    }
}

impl From<io::Error> for RepackError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// An archive loaded for repacking.
///
/// The chunk payloads and common data are held as one mutable body; device
/// data blocks are held separately so they can be dropped or transplanted
/// whole. [`serialize`](Self::serialize) reassembles the file with recomputed
/// block base offsets.
pub struct ArchiveRepacker {
    index: ArchiveIndex,
    /// Everything between the chunk directory and the first device block.
    body: Vec<u8>,
    /// Absolute offset of `body` in the file.
    body_base: u32,
    blocks: [Option<Vec<u8>>; DEVICE_TYPE_COUNT],
}

impl ArchiveRepacker {
    /// Parses an archive for repacking, validating its structure.
    pub fn new(source: &dyn ArchiveSource) -> Result<Self, RepackError> {
        let index = ArchiveIndex::read(source)?;
        let file_size = source.len();

        let body_base =
            mem::size_of::<ArchiveHeader>() + index.chunks.len() * mem::size_of::<ChunkHeader>();

        // Present blocks sorted by base offset; each runs to the next one.
        let mut present: Vec<(usize, u32)> = index
            .base_offsets
            .iter()
            .enumerate()
            .filter(|&(_, &base)| base != INVALID_OFFSET)
            .map(|(device_index, &base)| (device_index, base))
            .collect();
        present.sort_by_key(|&(_, base)| base);

        let body_end = present
            .first()
            .map_or(file_size, |&(_, base)| u64::from(base));

        if (body_base as u64) > body_end {
            return Err(ArchiveError::Corrupt {
                detail: format!(
                    "device blocks start at {} inside the chunk directory",
                    body_end,
                ),
            }
            .into());
        }

        let mut body = vec![0u8; (body_end - body_base as u64) as usize];
        source.read_at(body_base as u64, &mut body)?;

        let mut blocks: [Option<Vec<u8>>; DEVICE_TYPE_COUNT] = Default::default();

        for (position, &(device_index, base)) in present.iter().enumerate() {
            let end = present
                .get(position + 1)
                .map_or(file_size, |&(_, next)| u64::from(next));

            let mut block = vec![0u8; (end - u64::from(base)) as usize];
            source.read_at(u64::from(base), &mut block)?;
            blocks[device_index] = Some(block);
        }

        Ok(Self {
            index,
            body,
            body_base: body_base as u32,
            blocks,
        })
    }

    /// Devices that have a data block in this archive.
    pub fn present_devices(&self) -> impl Iterator<Item = DeviceType> + '_ {
        DeviceType::ALL
            .into_iter()
            .filter(|device| self.blocks[device.index()].is_some())
    }

    /// Removes one backend's data block and marks every resource as having no
    /// data for it.
    pub fn remove_device_data(&mut self, device: DeviceType) -> Result<(), RepackError> {
        let device_index = device.index();

        if self.blocks[device_index].is_none() {
            return Err(RepackError::NoDeviceData { device });
        }

        for kind in ResourceKind::ALL {
            if kind == ResourceKind::RenderPass {
                continue;
            }

            let regions: Vec<ArchiveRegion> =
                self.index.resources[kind.index()].values().copied().collect();

            for region in regions {
                self.patch_data_header(region.offset, |header| {
                    header.clear_device_data(device_index);
                })?;
            }
        }

        if let Some(offset) = self.shaders_chunk_offset() {
            self.patch_data_header(offset, |header| {
                header.clear_device_data(device_index);
            })?;

            if let Some(shaders) = &mut self.index.shaders {
                shaders.clear_device_data(device_index);
            }
        }

        self.blocks[device_index] = None;
        self.index.base_offsets[device_index] = INVALID_OFFSET;

        info!("removed {} data block", device);

        Ok(())
    }

    /// Transplants one backend's data block from `source` into this archive.
    ///
    /// This archive must contain every resource `source` contains, with
    /// byte-identical common data, and must not already have data for the
    /// backend. The block is copied whole, so the per-resource offsets taken
    /// from `source` stay valid.
    pub fn append_device_data(
        &mut self,
        source: &ArchiveRepacker,
        device: DeviceType,
    ) -> Result<(), RepackError> {
        let device_index = device.index();

        let Some(block) = &source.blocks[device_index] else {
            return Err(RepackError::NoDeviceData { device });
        };

        if self.blocks[device_index].is_some() {
            return Err(RepackError::DeviceDataPresent { device });
        }

        if source.index.shaders.is_some() != self.index.shaders.is_some() {
            return Err(RepackError::ShaderChunkMismatch);
        }

        // Validate first so a failed append leaves this archive untouched.
        for kind in ResourceKind::ALL {
            for (name, &src_region) in &source.index.resources[kind.index()] {
                let Some(&dst_region) = self.index.resources[kind.index()].get(name) else {
                    return Err(RepackError::MissingResource {
                        kind,
                        name: name.clone(),
                    });
                };

                if !self.common_payload_matches(kind, dst_region, source, src_region)? {
                    return Err(RepackError::ContentMismatch {
                        kind,
                        name: name.clone(),
                    });
                }
            }
        }

        // Copy the backend's header fields of every resource source has.
        for kind in ResourceKind::ALL {
            if kind == ResourceKind::RenderPass {
                continue;
            }

            for (name, &src_region) in &source.index.resources[kind.index()] {
                let dst_region = self.index.resources[kind.index()][name];
                let src_header = source.read_data_header(src_region.offset)?;

                self.patch_data_header(dst_region.offset, |header| {
                    header.device_size[device_index] = src_header.device_size[device_index];
                    header.device_offset[device_index] = src_header.device_offset[device_index];
                })?;
            }
        }

        if let (Some(offset), Some(src_shaders)) =
            (self.shaders_chunk_offset(), &source.index.shaders)
        {
            let size = src_shaders.device_size[device_index];
            let data_offset = src_shaders.device_offset[device_index];

            self.patch_data_header(offset, |header| {
                header.device_size[device_index] = size;
                header.device_offset[device_index] = data_offset;
            })?;

            if let Some(shaders) = &mut self.index.shaders {
                shaders.device_size[device_index] = size;
                shaders.device_offset[device_index] = data_offset;
            }
        }

        self.blocks[device_index] = Some(block.clone());

        info!("appended {} data block ({} bytes)", device, block.len());

        Ok(())
    }

    /// Reassembles the archive with recomputed block base offsets.
    pub fn serialize(&self) -> Result<Vec<u8>, RepackError> {
        let mut offset = u64::from(self.body_base) + self.body.len() as u64;
        let mut base_offsets = [INVALID_OFFSET; DEVICE_TYPE_COUNT];

        for (device_index, block) in self.blocks.iter().enumerate() {
            if let Some(block) = block {
                base_offsets[device_index] = offset as u32;
                offset += block.len() as u64;
            }
        }

        if offset > u64::from(u32::MAX) {
            return Err(RepackError::ArchiveTooLarge { size: offset });
        }

        let header = ArchiveHeader {
            magic: ARCHIVE_MAGIC,
            version: ARCHIVE_VERSION,
            block_base_offsets: base_offsets,
            num_chunks: self.index.chunks.len() as u32,
            _pad: 0,
        };

        let mut archive = Vec::with_capacity(offset as usize);
        archive.extend_from_slice(bytemuck::bytes_of(&header));
        archive.extend_from_slice(bytemuck::cast_slice(&self.index.chunks));
        archive.extend_from_slice(&self.body);
        for block in self.blocks.iter().flatten() {
            archive.extend_from_slice(block);
        }

        debug_assert_eq!(archive.len(), offset as usize);

        Ok(archive)
    }

    /// Serializes the archive and writes it to `writer`.
    pub fn serialize_to_stream<W: io::Write>(&self, writer: &mut W) -> Result<(), RepackError> {
        let bytes = self.serialize()?;
        writer.write_all(&bytes)?;

        Ok(())
    }

    // ----------------------------------------------------------- internals

    fn shaders_chunk_offset(&self) -> Option<u32> {
        self.index
            .chunks
            .iter()
            .find(|chunk| chunk.chunk_type == ChunkType::Shaders as u32)
            .map(|chunk| chunk.offset)
    }

    /// Body slice of a common data region, with bounds validated.
    fn body_range(&self, offset: u32, size: usize) -> Result<std::ops::Range<usize>, RepackError> {
        let start = offset
            .checked_sub(self.body_base)
            .map(|start| start as usize)
            .filter(|&start| start + size <= self.body.len())
            .ok_or_else(|| ArchiveError::Corrupt {
                detail: format!(
                    "region [{}, {}) lies outside the archive body",
                    offset,
                    u64::from(offset) + size as u64,
                ),
            })?;

        Ok(start..start + size)
    }

    fn read_data_header(&self, offset: u32) -> Result<DataHeader, RepackError> {
        let range = self.body_range(offset, mem::size_of::<DataHeader>())?;

        Ok(bytemuck::pod_read_unaligned(&self.body[range]))
    }

    fn patch_data_header(
        &mut self,
        offset: u32,
        patch: impl FnOnce(&mut DataHeader),
    ) -> Result<(), RepackError> {
        let range = self.body_range(offset, mem::size_of::<DataHeader>())?;

        let mut header: DataHeader = bytemuck::pod_read_unaligned(&self.body[range.clone()]);
        patch(&mut header);
        self.body[range].copy_from_slice(bytemuck::bytes_of(&header));

        Ok(())
    }

    /// Compares the device-independent part of a resource's common data
    /// between this archive and `other`.
    ///
    /// Render pass regions carry no device directory, so they must match
    /// whole; other kinds are compared past the [`DataHeader`], which differs
    /// per archive by construction.
    fn common_payload_matches(
        &self,
        kind: ResourceKind,
        region: ArchiveRegion,
        other: &ArchiveRepacker,
        other_region: ArchiveRegion,
    ) -> Result<bool, RepackError> {
        if region.size != other_region.size {
            return Ok(false);
        }

        let skip = if kind == ResourceKind::RenderPass {
            0
        } else {
            mem::size_of::<DataHeader>()
        };

        if (region.size as usize) < skip {
            return Ok(false);
        }

        let range = self.body_range(region.offset, region.size as usize)?;
        let other_range = other.body_range(other_region.offset, other_region.size as usize)?;

        Ok(self.body[range][skip..] == other.body[other_range][skip..])
    }
}
