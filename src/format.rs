//! Physical binary layout of pipearc archive files.
//!
//! An archive is written once and read many times; nothing in this layout is
//! ever modified in place. The file is partitioned by a fixed header into a
//! chunk table, a per-backend block offset table, and a body holding common
//! directory data plus backend-keyed data blocks.
//!
//! ## High-level structure
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ ArchiveHeader (36 bytes)             │  magic, version, chunk count,
//! │                                      │  block base offset per backend
//! ├──────────────────────────────────────┤
//! │ ChunkHeader × num_chunks (12 B each) │  type, size, offset
//! ├──────────────────────────────────────┤
//! │ Chunk bodies (directories)           │  name → (offset, size) tables
//! ├──────────────────────────────────────┤
//! │ Common entry blocks                  │  DataHeader + descriptor tail
//! ├──────────────────────────────────────┤
//! │ Backend data blocks (up to 6)        │  shader lists, blobs, attribs
//! └──────────────────────────────────────┘
//! ```
//!
//! ## Entry anatomy
//!
//! Every named resource entry begins with a [`DataHeader`] carrying one
//! `(offset, size)` pair per backend, relative to that backend's block base
//! offset. A reader bound to one [`Backend`] only ever touches its own slot.
//! The descriptor tail after the header is backend-agnostic.
//!
//! ## Compatibility
//!
//! - All multi-byte integers are little-endian.
//! - Strings are NUL-terminated.
//! - The version must match [`HEADER_VERSION`] exactly; forward
//!   compatibility is refused, not negotiated.
//! - Fixed headers are read as typed views ([`bytemuck::Pod`]), which assumes
//!   a little-endian host. Integer fields outside these headers are encoded
//!   explicitly via `to_le_bytes`/`from_le_bytes`.

use bytemuck::{Pod, Zeroable};

use crate::error::{ArchiveError, Result};

/// Magic number identifying the file format: "PARC" read as a
/// little-endian `u32`.
pub const MAGIC_NUMBER: u32 = u32::from_le_bytes(*b"PARC");

/// Format version. An exact match is required when opening an archive.
pub const HEADER_VERSION: u32 = 2;

/// Sentinel for an absent offset (no block / no data for a backend).
pub const INVALID_OFFSET: u32 = u32::MAX;

/// Alignment of every allocation handed out for decoded entry data.
pub const DATA_PTR_ALIGN: usize = 8;

/// Upper bound on the number of resource signatures a pipeline may use.
pub const MAX_RESOURCE_SIGNATURES: u32 = 8;

/// The rendering backends an archive can carry data blocks for.
///
/// Each reader is constructed bound to exactly one tag and only reads that
/// tag's block. GLES consumes the OpenGL block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum Backend {
    /// OpenGL and OpenGL ES.
    OpenGL = 0,
    /// Direct3D11.
    Direct3D11 = 1,
    /// Direct3D12.
    Direct3D12 = 2,
    /// Vulkan.
    Vulkan = 3,
    /// Metal on iOS.
    MetalIos = 4,
    /// Metal on macOS.
    MetalMacos = 5,
}

impl Backend {
    /// Number of backend tags (and of block offset table slots).
    pub const COUNT: usize = 6;

    /// All tags in block-table order.
    pub const ALL: [Backend; Backend::COUNT] = [
        Backend::OpenGL,
        Backend::Direct3D11,
        Backend::Direct3D12,
        Backend::Vulkan,
        Backend::MetalIos,
        Backend::MetalMacos,
    ];

    /// Slot of this backend in block offset tables and per-entry headers.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

bitflags::bitflags! {
    /// Bit mask of backends, used to restrict which backends carry compiled
    /// data when serializing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFlags: u32 {
        /// OpenGL / OpenGL ES.
        const OPEN_GL = 1 << Backend::OpenGL as u32;
        /// Direct3D11.
        const D3D11 = 1 << Backend::Direct3D11 as u32;
        /// Direct3D12.
        const D3D12 = 1 << Backend::Direct3D12 as u32;
        /// Vulkan.
        const VULKAN = 1 << Backend::Vulkan as u32;
        /// Metal on iOS.
        const METAL_IOS = 1 << Backend::MetalIos as u32;
        /// Metal on macOS.
        const METAL_MACOS = 1 << Backend::MetalMacos as u32;
    }
}

impl From<Backend> for DeviceFlags {
    fn from(backend: Backend) -> Self {
        DeviceFlags::from_bits_truncate(1 << backend as u32)
    }
}

/// Type tag of a chunk. At most one chunk per type may appear in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ChunkType {
    /// API version tag and source-tree commit hash; informational only.
    ArchiveDebugInfo = 1,
    /// Pipeline resource signature directory.
    ResourceSignature = 2,
    /// Graphics pipeline state directory.
    GraphicsPipelineStates = 3,
    /// Compute pipeline state directory.
    ComputePipelineStates = 4,
    /// Ray-tracing pipeline state directory.
    RayTracingPipelineStates = 5,
    /// Tile pipeline state directory.
    TilePipelineStates = 6,
    /// Render pass directory.
    RenderPass = 7,
    /// Indexed shader table.
    Shaders = 8,
}

impl ChunkType {
    /// Number of chunk types.
    pub const COUNT: usize = 8;

    /// Decodes a raw tag, rejecting anything outside the known set.
    pub fn from_u32(raw: u32) -> Result<Self> {
        Ok(match raw {
            1 => Self::ArchiveDebugInfo,
            2 => Self::ResourceSignature,
            3 => Self::GraphicsPipelineStates,
            4 => Self::ComputePipelineStates,
            5 => Self::RayTracingPipelineStates,
            6 => Self::TilePipelineStates,
            7 => Self::RenderPass,
            8 => Self::Shaders,
            _ => return Err(ArchiveError::UnknownChunkType(raw)),
        })
    }

    /// Dense index for "one chunk per type" bookkeeping.
    #[inline]
    pub const fn bit(self) -> usize {
        self as usize - 1
    }
}

/// The fixed header at offset 0 of every archive file.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ArchiveHeader {
    /// Must equal [`MAGIC_NUMBER`].
    pub magic: u32,
    /// Must equal [`HEADER_VERSION`].
    pub version: u32,
    /// Number of [`ChunkHeader`]s immediately following this header.
    pub num_chunks: u32,
    /// Absolute base offset of each backend's data block, or
    /// [`INVALID_OFFSET`] when the archive carries no data for that backend.
    pub block_base_offsets: [u32; Backend::COUNT],
}

/// Size of the serialized [`ArchiveHeader`].
pub const ARCHIVE_HEADER_SIZE: usize = std::mem::size_of::<ArchiveHeader>();

/// Size of one serialized [`ChunkHeader`].
pub const CHUNK_HEADER_SIZE: usize = std::mem::size_of::<ChunkHeader>();

/// A type-tagged, byte-ranged region of the file body.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ChunkHeader {
    /// Raw [`ChunkType`] tag.
    pub chunk_type: u32,
    /// Size of the chunk body in bytes.
    pub size: u32,
    /// Absolute offset of the chunk body.
    pub offset: u32,
}

impl ChunkHeader {
    /// Decoded chunk type, or `UnknownChunkType`.
    pub fn chunk_type(&self) -> Result<ChunkType> {
        ChunkType::from_u32(self.chunk_type)
    }
}

/// Offset/size pair addressing a byte range, used by directories (absolute
/// offsets) and shader tables (relative to a backend block base).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct FileOffsetAndSize {
    /// Byte offset of the range.
    pub offset: u32,
    /// Length of the range in bytes.
    pub size: u32,
}

/// Per-entry common header: the entry's type tag plus one `(size, offset)`
/// pair per backend, relative to that backend's block base offset.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct DataHeader {
    /// Raw [`ChunkType`] tag of the resource kind this entry belongs to.
    pub chunk_type: u32,
    /// Backend data sizes; 0 means the backend carries no data.
    pub sizes: [u32; Backend::COUNT],
    /// Backend data offsets; [`INVALID_OFFSET`] when absent.
    pub offsets: [u32; Backend::COUNT],
}

impl DataHeader {
    /// Creates a header with every backend slot marked absent.
    pub fn new(chunk_type: ChunkType) -> Self {
        Self {
            chunk_type: chunk_type as u32,
            sizes: [0; Backend::COUNT],
            offsets: [INVALID_OFFSET; Backend::COUNT],
        }
    }

    /// Size of the backend's data, 0 when absent.
    #[inline]
    pub fn size(&self, backend: Backend) -> u32 {
        self.sizes[backend.index()]
    }

    /// Offset of the backend's data relative to its block base.
    #[inline]
    pub fn offset(&self, backend: Backend) -> u32 {
        self.offsets[backend.index()]
    }

    /// One-past-the-end offset of the backend's data relative to its block
    /// base. `None` when the slot is absent or the range overflows `u64`.
    pub fn end_offset(&self, backend: Backend) -> Option<u64> {
        let i = backend.index();
        if self.sizes[i] == 0 || self.offsets[i] == INVALID_OFFSET {
            return None;
        }
        Some(u64::from(self.offsets[i]) + u64::from(self.sizes[i]))
    }

    /// Records the backend's data range.
    pub fn set_range(&mut self, backend: Backend, offset: u32, size: u32) {
        let i = backend.index();
        self.offsets[i] = offset;
        self.sizes[i] = size;
    }
}
