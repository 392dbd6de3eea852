//! # pipearc
//!
//! A cross-backend archive for graphics pipeline state. Off-line, a
//! [`SerializationDevice`] accepts shaders, render passes, pipeline
//! resource signatures and pipeline state descriptions, and an
//! [`Archiver`] emits a single binary holding per-backend compiled
//! artifacts: bytecode, descriptor layouts, binding numbers. At runtime, a
//! [`DeviceObjectArchive`] reads that file, resolves named entries,
//! hydrates the data for one concrete backend, and reconstructs live
//! objects through a [`RenderDevice`] implementation.
//!
//! ## Overview
//!
//! One archive serves up to six backends: OpenGL/GLES, Direct3D11,
//! Direct3D12, Vulkan, and Metal on iOS and macOS. Descriptors that do
//! not depend on the API (render pass layout, fixed-function state,
//! declared resources) are stored once in a common region; everything
//! API-specific (shader bytecode, binding attributes, shader index lists)
//! lives in a per-backend data block. A reader is bound to exactly one
//! backend tag and never touches the other blocks.
//!
//! ### Key properties
//!
//! *   **Write once, read many.** The format has no in-place updates. The
//!     version must match exactly; forward compatibility is refused, not
//!     negotiated.
//! *   **Lazy hydration.** Construction parses only the header, chunk
//!     table and name directories. Entry bytes are read when an object is
//!     requested by name.
//! *   **Content-addressed shaders.** Identical shader blobs collapse to
//!     one table slot per backend; pipelines share constructed shaders
//!     through a mutex-guarded cache.
//! *   **Deterministic binding layout.** For every backend, the mapping
//!     from an ordered signature set to concrete register/space/binding
//!     triples is a pure function, exposed off-line through
//!     [`SerializationDevice::get_pipeline_resource_bindings`].
//!
//! ## Usage
//!
//! Write side:
//!
//! ```rust,ignore
//! use pipearc::{Archiver, DeviceFlags, SerializationDevice};
//!
//! let device = SerializationDevice::new();
//! let vs = device.create_shader(&vs_ci, DeviceFlags::VULKAN | DeviceFlags::D3D12)?;
//! let ps = device.create_shader(&ps_ci, DeviceFlags::VULKAN | DeviceFlags::D3D12)?;
//! let signature = device.create_resource_signature(&signature_desc, DeviceFlags::all())?;
//!
//! let mut archiver = Archiver::new();
//! archiver.add_graphics_pipeline(&pipeline_info)?;
//! archiver.save("pipelines.parc")?;
//! ```
//!
//! Read side:
//!
//! ```rust,ignore
//! use pipearc::{Backend, DeviceObjectArchive};
//!
//! let archive = DeviceObjectArchive::<MyDevice>::open("pipelines.parc", Backend::Vulkan)?;
//! let pso = archive.unpack_graphics_pipeline("GBuffer", &my_device)?;
//! ```
//!
//! ## Concurrency
//!
//! After construction an archive is shared freely across threads.
//! Directories are immutable; only their memoization slots mutate, under
//! the directory lock. The shader cache holds a single mutex that is
//! never held across file reads or device calls. Racing unpacks of the
//! same name are benign: each may construct the object, the cache keeps
//! one winner.
//!
//! ## Errors
//!
//! Every failure is a variant of [`ArchiveError`]; the taxonomy is
//! closed. Construction errors are fatal to the archive object; per-entry
//! errors are logged diagnostics plus an `Err` from the unpack call, and
//! never invalidate the archive or populate a cache.
//!
//! ## Safety
//!
//! `unsafe` is confined to two audited spots: the decode arena's
//! lifetime extension and memory-mapping archive files. Everything else,
//! including the whole wire codec, is safe Rust with explicit bounds
//! checks.

#![deny(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod archive;
pub mod archiver;
pub mod arena;
pub mod binding;
pub mod codec;
pub mod device;
pub mod directory;
pub mod error;
pub mod format;
pub mod serialization;
pub mod serializer;
pub mod source;
pub mod types;

pub use archive::{ArchiveDebugInfo, DeviceObjectArchive};
pub use archiver::{
    Archiver, ComputePipelineArchiveInfo, GeneralShaderGroupInfo, GraphicsPipelineArchiveInfo,
    ProceduralHitShaderGroupInfo, RayTracingPipelineArchiveInfo, TilePipelineArchiveInfo,
    TriangleHitShaderGroupInfo,
};
pub use binding::PipelineResourceBinding;
pub use device::RenderDevice;
pub use error::{ArchiveError, Result};
pub use format::{Backend, ChunkType, DeviceFlags, HEADER_VERSION, MAGIC_NUMBER};
pub use serialization::{
    valid_device_flags, PipelineResourceBindingAttribs, SerializationDevice, SerializedRenderPass,
    SerializedResourceSignature, SerializedShader,
};
pub use source::{ArchiveSource, DataSource};
