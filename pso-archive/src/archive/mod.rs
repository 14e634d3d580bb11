// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The archive container format.
//!
//! An archive is laid out as:
//!
//! ```text
//! ArchiveHeader
//! ChunkHeader[num_chunks]
//! chunk payloads            (named resource tables, debug info)
//! common data               (device-independent serialized descriptions)
//! device data block         (OpenGL)
//! device data block         (Direct3D11)
//! ...                       (one optional block per backend, fixed order)
//! ```
//!
//! All multi-byte values are native-endian; archives are not portable across
//! byte orders. The header structs below are byte-exact and their sizes are
//! asserted at compile time.

use std::{
    error::Error,
    fmt, io,
    mem,
    path::Path,
};

use bytemuck::{Pod, Zeroable};

use crate::{
    device::DEVICE_TYPE_COUNT,
    serializer::SerializeError,
};

pub mod dearchiver;
pub mod reader;
pub mod repacker;
pub(crate) mod schema;

pub use dearchiver::{Dearchiver, DeviceObjectFactory, PipelineResources, RayTracingResources};
pub use reader::{ArchiveDebugInfo, DeviceObjectArchive};
pub use repacker::{ArchiveRepacker, RepackError};

/// First four bytes of every archive.
pub const ARCHIVE_MAGIC: u32 = 0xDE00_000A;

/// Current archive format version.
pub const ARCHIVE_VERSION: u32 = 3;

/// Sentinel for absent offsets in headers.
pub const INVALID_OFFSET: u32 = u32::MAX;

/// Identifies the payload kind of a chunk or data header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ChunkType {
    Undefined = 0,
    ArchiveDebugInfo = 1,
    ResourceSignature = 2,
    GraphicsPipelineStates = 3,
    ComputePipelineStates = 4,
    RayTracingPipelineStates = 5,
    TilePipelineStates = 6,
    RenderPass = 7,
    Shaders = 8,
}

/// Number of defined chunk types, including `Undefined`.
pub const CHUNK_TYPE_COUNT: usize = 9;

impl ChunkType {
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Undefined),
            1 => Some(Self::ArchiveDebugInfo),
            2 => Some(Self::ResourceSignature),
            3 => Some(Self::GraphicsPipelineStates),
            4 => Some(Self::ComputePipelineStates),
            5 => Some(Self::RayTracingPipelineStates),
            6 => Some(Self::TilePipelineStates),
            7 => Some(Self::RenderPass),
            8 => Some(Self::Shaders),
            _ => None,
        }
    }
}

/// The named resource kinds an archive indexes.
///
/// Shaders and debug info are chunk types but not named resources; they have
/// their own payload layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Signature,
    GraphicsPipeline,
    ComputePipeline,
    RayTracingPipeline,
    TilePipeline,
    RenderPass,
}

/// Number of named resource kinds.
pub const RESOURCE_KIND_COUNT: usize = 6;

impl ResourceKind {
    pub const ALL: [ResourceKind; RESOURCE_KIND_COUNT] = [
        ResourceKind::Signature,
        ResourceKind::GraphicsPipeline,
        ResourceKind::ComputePipeline,
        ResourceKind::RayTracingPipeline,
        ResourceKind::TilePipeline,
        ResourceKind::RenderPass,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn chunk_type(self) -> ChunkType {
        match self {
            ResourceKind::Signature => ChunkType::ResourceSignature,
            ResourceKind::GraphicsPipeline => ChunkType::GraphicsPipelineStates,
            ResourceKind::ComputePipeline => ChunkType::ComputePipelineStates,
            ResourceKind::RayTracingPipeline => ChunkType::RayTracingPipelineStates,
            ResourceKind::TilePipeline => ChunkType::TilePipelineStates,
            ResourceKind::RenderPass => ChunkType::RenderPass,
        }
    }

    pub const fn from_chunk_type(chunk_type: ChunkType) -> Option<Self> {
        match chunk_type {
            ChunkType::ResourceSignature => Some(ResourceKind::Signature),
            ChunkType::GraphicsPipelineStates => Some(ResourceKind::GraphicsPipeline),
            ChunkType::ComputePipelineStates => Some(ResourceKind::ComputePipeline),
            ChunkType::RayTracingPipelineStates => Some(ResourceKind::RayTracingPipeline),
            ChunkType::TilePipelineStates => Some(ResourceKind::TilePipeline),
            ChunkType::RenderPass => Some(ResourceKind::RenderPass),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ResourceKind::Signature => "resource signature",
            ResourceKind::GraphicsPipeline => "graphics pipeline",
            ResourceKind::ComputePipeline => "compute pipeline",
            ResourceKind::RayTracingPipeline => "ray tracing pipeline",
            ResourceKind::TilePipeline => "tile pipeline",
            ResourceKind::RenderPass => "render pass",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// File header at offset zero.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct ArchiveHeader {
    pub magic: u32,
    pub version: u32,
    /// Absolute offset of each backend's device data block, or
    /// [`INVALID_OFFSET`] when the block is absent.
    pub block_base_offsets: [u32; DEVICE_TYPE_COUNT],
    pub num_chunks: u32,
    pub _pad: u32,
}

const _: () = assert!(mem::size_of::<ArchiveHeader>() == 40);

/// Directory entry for one chunk, following the file header.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct ChunkHeader {
    pub chunk_type: u32,
    pub size: u32,
    /// Absolute offset of the chunk payload.
    pub offset: u32,
    pub _pad: u32,
}

const _: () = assert!(mem::size_of::<ChunkHeader>() == 16);

/// Header of a named resource chunk payload.
///
/// Followed by three parallel `u32` arrays (`name_len`, `data_size`,
/// `data_offset`, `count` entries each) and the packed NUL-terminated names.
/// `data_offset` entries are absolute offsets into the common data.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct NamedResourceArrayHeader {
    pub count: u32,
    pub _pad: u32,
}

const _: () = assert!(mem::size_of::<NamedResourceArrayHeader>() == 8);

/// Leading header of per-resource common data that carries device blocks.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct DataHeader {
    pub chunk_type: u32,
    /// Size of this resource's data in each backend's block; 0 when absent.
    pub device_size: [u32; DEVICE_TYPE_COUNT],
    /// Offset of this resource's data relative to each backend's block base;
    /// [`INVALID_OFFSET`] when absent.
    pub device_offset: [u32; DEVICE_TYPE_COUNT],
    pub _pad: u32,
}

const _: () = assert!(mem::size_of::<DataHeader>() == 56);

impl DataHeader {
    pub fn new(chunk_type: ChunkType) -> Self {
        Self {
            chunk_type: chunk_type as u32,
            device_size: [0; DEVICE_TYPE_COUNT],
            device_offset: [INVALID_OFFSET; DEVICE_TYPE_COUNT],
            _pad: 0,
        }
    }

    /// Whether the backend at `index` has data for this resource.
    pub fn has_device_data(&self, index: usize) -> bool {
        self.device_size[index] != 0 && self.device_offset[index] != INVALID_OFFSET
    }

    /// Clears the backend at `index` to the absent state.
    pub fn clear_device_data(&mut self, index: usize) {
        self.device_size[index] = 0;
        self.device_offset[index] = INVALID_OFFSET;
    }
}

/// Leading header of render pass common data, which has no device blocks.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct RpDataHeader {
    pub chunk_type: u32,
    pub _pad: u32,
}

const _: () = assert!(mem::size_of::<RpDataHeader>() == 8);

/// An (offset, size) pair addressing a range of the archive or of a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ArchiveRegion {
    pub offset: u32,
    pub size: u32,
}

const _: () = assert!(mem::size_of::<ArchiveRegion>() == 8);

impl ArchiveRegion {
    pub fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }

    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }
}

/// Random-access byte source an archive is read from.
pub trait ArchiveSource: Send + Sync {
    fn len(&self) -> u64;

    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
}

impl ArchiveSource for Vec<u8> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        read_from_slice(self, offset, buf)
    }
}

impl ArchiveSource for Box<[u8]> {
    fn len(&self) -> u64 {
        self.as_ref().len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        read_from_slice(self, offset, buf)
    }
}

fn read_from_slice(slice: &[u8], offset: u64, buf: &mut [u8]) -> io::Result<()> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|&start| start <= slice.len())
        .ok_or(io::ErrorKind::UnexpectedEof)?;
    let end = start
        .checked_add(buf.len())
        .filter(|&end| end <= slice.len())
        .ok_or(io::ErrorKind::UnexpectedEof)?;

    buf.copy_from_slice(&slice[start..end]);

    Ok(())
}

/// File-backed archive source.
///
/// Reads seek under a mutex, so concurrent readers serialize on I/O but stay
/// correct on every platform.
pub struct FileSource {
    file: parking_lot::Mutex<std::fs::File>,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            file: parking_lot::Mutex::new(file),
            len,
        })
    }
}

impl ArchiveSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        use io::{Read, Seek};

        let mut file = self.file.lock();
        file.seek(io::SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }
}

/// Error type for reading, unpacking and writing archives.
#[derive(Debug)]
pub enum ArchiveError {
    /// The file does not start with the archive magic number.
    InvalidMagic { found: u32 },
    /// The archive was produced by an incompatible format version.
    UnsupportedVersion { found: u32 },
    /// Structural inconsistency: overlapping or out-of-range chunks,
    /// duplicate chunk types, malformed name tables.
    Corrupt { detail: String },
    /// The archive does not contain the requested resource.
    ResourceNotFound { kind: ResourceKind, name: String },
    /// A resource exists but has no data for the requested backend.
    MissingDeviceData {
        device: crate::device::DeviceType,
        name: String,
    },
    /// A data header carried an unexpected chunk type tag.
    WrongDataType { expected: ChunkType, found: u32 },
    /// A device object factory failed to create an object.
    ObjectCreation { message: String },
    Deserialize(SerializeError),
    Io(io::Error),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMagic { found } => {
                write!(
                    f,
                    "invalid archive magic {:#010x} (expected {:#010x})",
                    found, ARCHIVE_MAGIC,
                )
            }
            Self::UnsupportedVersion { found } => {
                write!(
                    f,
                    "unsupported archive version {} (supported version is {})",
                    found, ARCHIVE_VERSION,
                )
            }
            Self::Corrupt { detail } => write!(f, "corrupt archive: {}", detail),
            Self::ResourceNotFound { kind, name } => {
                write!(f, "archive does not contain {} `{}`", kind, name)
            }
            Self::MissingDeviceData { device, name } => {
                write!(f, "archive contains no {} data for `{}`", device, name)
            }
            Self::WrongDataType { expected, found } => {
                write!(
                    f,
                    "data header tagged {:#x} where chunk type {:?} was expected",
                    found, expected,
                )
            }
            Self::ObjectCreation { message } => {
                write!(f, "device object creation failed: {}", message)
            }
            Self::Deserialize(err) => write!(f, "deserialization failed: {}", err),
            Self::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl Error for ArchiveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Deserialize(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SerializeError> for ArchiveError {
    fn from(err: SerializeError) -> Self {
        Self::Deserialize(err)
    }
}

impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source_bounds() {
        let source = vec![1u8, 2, 3, 4];
        let mut buf = [0u8; 2];

        source.read_at(1, &mut buf).unwrap();
        assert_eq!(buf, [2, 3]);

        assert!(source.read_at(3, &mut buf).is_err());
        assert!(source.read_at(u64::MAX, &mut buf).is_err());
    }

    #[test]
    fn chunk_type_round_trip() {
        for value in 0..CHUNK_TYPE_COUNT as u32 {
            let ty = ChunkType::from_u32(value).unwrap();
            assert_eq!(ty as u32, value);
        }

        assert_eq!(ChunkType::from_u32(CHUNK_TYPE_COUNT as u32), None);
    }

    #[test]
    fn resource_kind_chunk_mapping() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_chunk_type(kind.chunk_type()), Some(kind));
        }

        assert_eq!(ResourceKind::from_chunk_type(ChunkType::Shaders), None);
        assert_eq!(ResourceKind::from_chunk_type(ChunkType::ArchiveDebugInfo), None);
    }
}
