//! The device-object archive: reading, resolving and reconstructing.
//!
//! A [`DeviceObjectArchive`] is constructed over a random-access byte
//! source, bound to exactly one [`Backend`]. Construction parses the
//! header and chunk table and builds the name directories; everything else
//! is read lazily when a caller asks for an object by kind and name.
//!
//! ## Unpack skeleton
//!
//! Every pipeline kind follows the same steps: consult the kind's cache
//! (unless a mutation callback was passed), locate the entry, decode the
//! common descriptor, resolve referenced resources (render pass,
//! signatures), locate the backend block, load shaders through the shader
//! cache, run the callback and validate the locked fields, construct via
//! the device, memoize.
//!
//! ## Concurrency
//!
//! Directories are immutable after construction; their per-entry cache
//! slot is guarded by the directory lock. The shader table has a single
//! mutex which is never held across file reads or device calls, so a
//! blocking `create_shader` cannot stall other threads' cache hits.
//! Concurrent unpacks of the same name race benignly: both construct, the
//! cache keeps one winner, the loser's object becomes garbage.
//!
//! Per-entry failures are logged and returned as errors; they never
//! invalidate the archive and never populate a cache, so callers may
//! retry.

use std::io;
use std::sync::{Arc, Mutex};

use bytemuck::Zeroable;

use crate::arena::DecodeArena;
use crate::binding;
use crate::codec;
use crate::codec::{
    ComputePipelineStateCi, GraphicsPipelineStateCi, RayTracingPipelineStateCi,
    TilePipelineStateCi,
};
use crate::device::{
    LoadedShader, RenderDevice, ResolvedGeneralShaderGroup, ResolvedProceduralHitShaderGroup,
    ResolvedTriangleHitShaderGroup, UnpackedComputePipeline, UnpackedGraphicsPipeline,
    UnpackedRayTracingPipeline, UnpackedResourceSignature, UnpackedTilePipeline,
};
use crate::directory::NamedResourceMap;
use crate::error::{ArchiveError, Result};
use crate::format::{
    ArchiveHeader, Backend, ChunkHeader, ChunkType, DataHeader, FileOffsetAndSize,
    ARCHIVE_HEADER_SIZE, CHUNK_HEADER_SIZE, HEADER_VERSION, INVALID_OFFSET, MAGIC_NUMBER,
};
use crate::serializer::{ReadSerializer, SerializerOps};
use crate::source::{ArchiveSource, DataSource};
use crate::types::{
    RenderPassDesc, ResourceSignatureDesc, ShaderCreateInfo, ShaderStages, NO_SHADER_INDEX,
};

/// Informational metadata stored in the debug-info chunk.
#[derive(Debug, Clone, Default)]
pub struct ArchiveDebugInfo {
    /// API version tag of the writer.
    pub api_version: String,
    /// Source-tree commit hash of the writer.
    pub commit_hash: String,
}

#[derive(Debug)]
struct ShaderEntry<S> {
    offset_and_size: FileOffsetAndSize,
    cached: Option<LoadedShader<S>>,
}

/// Read side of the archive, bound to one backend and one device type.
pub struct DeviceObjectArchive<D: RenderDevice> {
    source: Box<dyn ArchiveSource>,
    backend: Backend,
    block_base_offsets: [u32; Backend::COUNT],
    debug_info: ArchiveDebugInfo,

    signatures: NamedResourceMap<D::ResourceSignature>,
    render_passes: NamedResourceMap<D::RenderPass>,
    graphics_psos: NamedResourceMap<D::PipelineState>,
    compute_psos: NamedResourceMap<D::PipelineState>,
    ray_tracing_psos: NamedResourceMap<D::PipelineState>,
    tile_psos: NamedResourceMap<D::PipelineState>,

    shaders: Mutex<Vec<ShaderEntry<D::Shader>>>,
}

impl<D: RenderDevice> std::fmt::Debug for DeviceObjectArchive<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceObjectArchive")
            .field("backend", &self.backend)
            .field("debug_info", &self.debug_info)
            .finish_non_exhaustive()
    }
}

fn read_failed(offset: u64, size: usize) -> ArchiveError {
    ArchiveError::Io(Arc::new(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("failed to read {size} bytes at offset {offset}"),
    )))
}

impl<D: RenderDevice> DeviceObjectArchive<D> {
    /// Opens an archive file for the given backend.
    pub fn open<P: AsRef<std::path::Path>>(path: P, backend: Backend) -> Result<Self> {
        let source = DataSource::open(path)?;
        Self::new(Box::new(source), backend)
    }

    /// Constructs an archive reader over an arbitrary byte source.
    ///
    /// Fails fatally on a bad magic number, a version mismatch, duplicate
    /// or unknown chunks, malformed directories, or I/O errors; no archive
    /// instance exists afterwards.
    pub fn new(source: Box<dyn ArchiveSource>, backend: Backend) -> Result<Self> {
        let header_bytes = read_range_from(source.as_ref(), 0, ARCHIVE_HEADER_SIZE)?;
        let header: ArchiveHeader = bytemuck::pod_read_unaligned(&header_bytes);

        if header.magic != MAGIC_NUMBER {
            return Err(ArchiveError::BadMagic {
                found: header.magic,
            });
        }
        if header.version != HEADER_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                found: header.version,
                expected: HEADER_VERSION,
            });
        }

        let num_chunks = header.num_chunks as usize;
        let table_size = num_chunks.checked_mul(CHUNK_HEADER_SIZE).ok_or_else(|| {
            ArchiveError::DecodeUnderflow("chunk count overflows the address space".into())
        })?;
        let table_end = ARCHIVE_HEADER_SIZE as u64 + table_size as u64;
        if table_end > source.size() {
            return Err(ArchiveError::DecodeUnderflow(format!(
                "chunk table of {num_chunks} chunks does not fit in the file"
            )));
        }
        let table_bytes = read_range_from(source.as_ref(), ARCHIVE_HEADER_SIZE as u64, table_size)?;

        let mut archive = Self {
            source,
            backend,
            block_base_offsets: header.block_base_offsets,
            debug_info: ArchiveDebugInfo::default(),
            signatures: NamedResourceMap::new(),
            render_passes: NamedResourceMap::new(),
            graphics_psos: NamedResourceMap::new(),
            compute_psos: NamedResourceMap::new(),
            ray_tracing_psos: NamedResourceMap::new(),
            tile_psos: NamedResourceMap::new(),
            shaders: Mutex::new(Vec::new()),
        };

        let mut processed = [false; ChunkType::COUNT];
        for raw in table_bytes.chunks_exact(CHUNK_HEADER_SIZE) {
            let chunk: ChunkHeader = bytemuck::pod_read_unaligned(raw);
            let ty = chunk.chunk_type()?;
            if processed[ty.bit()] {
                return Err(ArchiveError::DuplicateChunk(ty));
            }
            processed[ty.bit()] = true;

            match ty {
                ChunkType::ArchiveDebugInfo => archive.read_debug_info(&chunk)?,
                ChunkType::ResourceSignature => {
                    read_named_resources(archive.source.as_ref(), &chunk, &archive.signatures)?
                }
                ChunkType::GraphicsPipelineStates => {
                    read_named_resources(archive.source.as_ref(), &chunk, &archive.graphics_psos)?
                }
                ChunkType::ComputePipelineStates => {
                    read_named_resources(archive.source.as_ref(), &chunk, &archive.compute_psos)?
                }
                ChunkType::RayTracingPipelineStates => read_named_resources(
                    archive.source.as_ref(),
                    &chunk,
                    &archive.ray_tracing_psos,
                )?,
                ChunkType::TilePipelineStates => {
                    read_named_resources(archive.source.as_ref(), &chunk, &archive.tile_psos)?
                }
                ChunkType::RenderPass => {
                    read_named_resources(archive.source.as_ref(), &chunk, &archive.render_passes)?
                }
                ChunkType::Shaders => archive.read_shader_table(&chunk)?,
            }
        }

        Ok(archive)
    }

    /// The backend this reader consumes data blocks for.
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Writer metadata from the debug-info chunk, if one was present.
    pub fn debug_info(&self) -> &ArchiveDebugInfo {
        &self.debug_info
    }

    /// Drops every memoized shader and constructed object. Offsets stay
    /// valid; subsequent unpacks reconstruct from bytes.
    pub fn clear_resource_cache(&self) {
        {
            let mut table = self.shaders.lock().expect("shader cache lock poisoned");
            for entry in table.iter_mut() {
                entry.cached = None;
            }
        }
        self.signatures.clear_cache();
        self.render_passes.clear_cache();
        self.graphics_psos.clear_cache();
        self.compute_psos.clear_cache();
        self.ray_tracing_psos.clear_cache();
        self.tile_psos.clear_cache();
    }

    // --- Construction helpers ---

    fn read_debug_info(&mut self, chunk: &ChunkHeader) -> Result<()> {
        let bytes = self.read_range(chunk.offset as u64, chunk.size as usize)?;
        let mut ser = ReadSerializer::new(&bytes);
        let (mut api_version, mut commit_hash) = ("", "");
        codec::debug_info(&mut ser, &mut api_version, &mut commit_hash)?;

        if api_version != env!("CARGO_PKG_VERSION") {
            log::info!(
                "archive was created with API version '{api_version}' but is used with '{}'",
                env!("CARGO_PKG_VERSION")
            );
        }
        if let Some(built_hash) = option_env!("PIPEARC_COMMIT_HASH") {
            if commit_hash != built_hash {
                log::info!(
                    "archive was built from commit '{commit_hash}' but is used with '{built_hash}'"
                );
            }
        }

        self.debug_info = ArchiveDebugInfo {
            api_version: api_version.to_owned(),
            commit_hash: commit_hash.to_owned(),
        };
        Ok(())
    }

    fn read_shader_table(&mut self, chunk: &ChunkHeader) -> Result<()> {
        if chunk.size as usize != std::mem::size_of::<DataHeader>() {
            return Err(ArchiveError::DecodeUnderflow(
                "shader chunk has an unexpected size".into(),
            ));
        }
        let bytes = self.read_range(chunk.offset as u64, chunk.size as usize)?;
        let header: DataHeader = bytemuck::pod_read_unaligned(&bytes);
        if header.chunk_type != ChunkType::Shaders as u32 {
            return Err(ArchiveError::TypeMismatch {
                expected: ChunkType::Shaders,
                found: header.chunk_type,
            });
        }

        let list_bytes = match self.device_specific_data(&header, "shader list") {
            Ok(bytes) => bytes,
            Err(err) => {
                // An archive may carry no shaders for this backend; that
                // only matters once a pipeline asks for one.
                log::warn!("shader list is not available: {err}");
                return Ok(());
            }
        };

        let mut ser = ReadSerializer::new(&list_bytes);
        let mut count = 0u32;
        ser.u32(&mut count)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut offset_and_size = FileOffsetAndSize::zeroed();
            ser.pod(&mut offset_and_size)?;
            entries.push(ShaderEntry {
                offset_and_size,
                cached: None,
            });
        }

        *self.shaders.get_mut().expect("shader cache lock poisoned") = entries;
        Ok(())
    }

    // --- Byte access ---

    fn read_range(&self, offset: u64, size: usize) -> Result<Vec<u8>> {
        read_range_from(self.source.as_ref(), offset, size)
    }

    /// Resolves and reads the backend-specific block of one entry.
    fn device_specific_data(&self, header: &DataHeader, res_kind: &str) -> Result<Vec<u8>> {
        let base = self.block_base_offsets[self.backend.index()];
        if base == INVALID_OFFSET || u64::from(base) > self.source.size() {
            log::error!("required {:?} block does not exist in the archive", self.backend);
            return Err(ArchiveError::MissingBackendData(self.backend));
        }
        if header.size(self.backend) == 0 {
            log::error!(
                "device specific data is not specified for {res_kind} ({:?})",
                self.backend
            );
            return Err(ArchiveError::MissingBackendData(self.backend));
        }
        let end = header
            .end_offset(self.backend)
            .ok_or(ArchiveError::MissingBackendData(self.backend))?;
        if u64::from(base) + end > self.source.size() {
            return Err(ArchiveError::DecodeUnderflow(format!(
                "{res_kind} data block lies outside the archive"
            )));
        }

        self.read_range(
            u64::from(base) + u64::from(header.offset(self.backend)),
            header.size(self.backend) as usize,
        )
    }

    /// Locates a named entry, copies its common block into the arena, and
    /// validates the type tag. Returns the entry header and a serializer
    /// positioned at the descriptor tail.
    fn load_entry<'arena, T>(
        &self,
        map: &NamedResourceMap<T>,
        kind: &'static str,
        expected: ChunkType,
        name: &str,
        arena: &'arena DecodeArena,
    ) -> Result<(DataHeader, ReadSerializer<'arena>)> {
        let (offset, size) = map
            .get_offset_and_size(name)
            .ok_or_else(|| ArchiveError::NotFound {
                kind,
                name: name.to_owned(),
            })?;

        let bytes = self.read_range(offset as u64, size as usize)?;
        let data = arena.copy_bytes(&bytes);

        let mut ser = ReadSerializer::new(data);
        let mut header = DataHeader::zeroed();
        ser.pod(&mut header)?;
        if header.chunk_type != expected as u32 {
            return Err(ArchiveError::TypeMismatch {
                expected,
                found: header.chunk_type,
            });
        }
        Ok((header, ser))
    }

    // --- Shader cache (C7) ---

    /// Loads shaders by table index, memoizing constructed shaders. The
    /// table mutex is released across file reads and `create_shader`.
    fn load_shaders(&self, indices: &[u32], device: &D) -> Result<Vec<LoadedShader<D::Shader>>> {
        let base = self.block_base_offsets[self.backend.index()];
        if base == INVALID_OFFSET || u64::from(base) > self.source.size() {
            return Err(ArchiveError::MissingBackendData(self.backend));
        }

        let mut shaders = Vec::with_capacity(indices.len());
        for &index in indices {
            let offset_and_size = {
                let table = self.shaders.lock().expect("shader cache lock poisoned");
                let entry = table.get(index as usize).ok_or_else(|| {
                    ArchiveError::DecodeUnderflow(format!(
                        "shader index {index} is out of range (table holds {})",
                        table.len()
                    ))
                })?;
                if let Some(cached) = &entry.cached {
                    shaders.push(cached.clone());
                    continue;
                }
                entry.offset_and_size
            };

            // The lock is not held here: reading bytes and constructing the
            // shader may block, and construction may recursively touch
            // archive state.
            let bytes = self.read_range(
                u64::from(base) + u64::from(offset_and_size.offset),
                offset_and_size.size as usize,
            )?;
            let mut ser = ReadSerializer::new(&bytes);
            let mut ci = ShaderCreateInfo::default();
            codec::shader_create_info(&mut ser, &mut ci)?;

            let shader = device.create_shader(&ci)?;
            let loaded = LoadedShader {
                stage: ci.shader_type,
                shader,
            };

            {
                // A concurrent loser's construction is wasted work, not an
                // error: shaders built from the same bytes are
                // interchangeable, and the last install wins.
                let mut table = self.shaders.lock().expect("shader cache lock poisoned");
                if let Some(entry) = table.get_mut(index as usize) {
                    entry.cached = Some(loaded.clone());
                }
            }
            shaders.push(loaded);
        }
        Ok(shaders)
    }

    // --- Unpack operations (C6) ---

    /// Unpacks a resource signature, constructing it via the device or
    /// returning the memoized object.
    pub fn unpack_resource_signature(
        &self,
        name: &str,
        device: &D,
    ) -> Result<D::ResourceSignature> {
        if let Some(cached) = self.signatures.get_cached(name) {
            return Ok(cached);
        }
        match self.unpack_signature_uncached(name, device) {
            Ok(signature) => {
                self.signatures.set_cached(name, signature.clone());
                Ok(signature)
            }
            Err(err) => {
                log::error!("failed to unpack resource signature '{name}': {err}");
                Err(err)
            }
        }
    }

    fn unpack_signature_uncached(&self, name: &str, device: &D) -> Result<D::ResourceSignature> {
        let arena = DecodeArena::new();
        let (header, mut ser) = self.load_entry(
            &self.signatures,
            "resource signature",
            ChunkType::ResourceSignature,
            name,
            &arena,
        )?;

        let mut desc = ResourceSignatureDesc::default();
        codec::signature_desc(&mut ser, &mut desc)?;
        desc.name = arena.alloc_str(name);
        debug_assert!(ser.is_end());

        let attrib_bytes = self.device_specific_data(&header, "resource signature")?;
        let attribs = binding::decode_attribs(self.backend, &attrib_bytes)?;

        device.create_resource_signature(&UnpackedResourceSignature {
            desc,
            backend: self.backend,
            attribs,
        })
    }

    /// Unpacks a render pass, constructing it via the device or returning
    /// the memoized object.
    pub fn unpack_render_pass(&self, name: &str, device: &D) -> Result<D::RenderPass> {
        if let Some(cached) = self.render_passes.get_cached(name) {
            return Ok(cached);
        }
        match self.unpack_render_pass_impl(name, device, None::<fn(&mut RenderPassDesc<'_>)>) {
            Ok(render_pass) => {
                self.render_passes.set_cached(name, render_pass.clone());
                Ok(render_pass)
            }
            Err(err) => {
                log::error!("failed to unpack render pass '{name}': {err}");
                Err(err)
            }
        }
    }

    /// Unpacks a render pass, letting `modify` adjust the decoded
    /// description before construction. The result is not memoized.
    pub fn unpack_render_pass_with<F>(
        &self,
        name: &str,
        device: &D,
        modify: F,
    ) -> Result<D::RenderPass>
    where
        F: FnOnce(&mut RenderPassDesc<'_>),
    {
        self.unpack_render_pass_impl(name, device, Some(modify))
            .map_err(|err| {
                log::error!("failed to unpack render pass '{name}': {err}");
                err
            })
    }

    fn unpack_render_pass_impl<F>(
        &self,
        name: &str,
        device: &D,
        modify: Option<F>,
    ) -> Result<D::RenderPass>
    where
        F: FnOnce(&mut RenderPassDesc<'_>),
    {
        let arena = DecodeArena::new();
        let (_header, mut ser) = self.load_entry(
            &self.render_passes,
            "render pass",
            ChunkType::RenderPass,
            name,
            &arena,
        )?;

        let mut desc = RenderPassDesc::default();
        codec::render_pass_desc(&mut ser, &mut desc)?;
        desc.name = arena.alloc_str(name);
        debug_assert!(ser.is_end());

        if let Some(modify) = modify {
            modify(&mut desc);
        }
        device.create_render_pass(&desc)
    }

    /// Unpacks a graphics pipeline, constructing it via the device or
    /// returning the memoized object.
    pub fn unpack_graphics_pipeline(&self, name: &str, device: &D) -> Result<D::PipelineState> {
        if let Some(cached) = self.graphics_psos.get_cached(name) {
            return Ok(cached);
        }
        match self.unpack_graphics_impl(
            name,
            device,
            None::<fn(&mut UnpackedGraphicsPipeline<'_, D>)>,
        ) {
            Ok(pso) => {
                self.graphics_psos.set_cached(name, pso.clone());
                Ok(pso)
            }
            Err(err) => {
                log::error!("failed to unpack graphics pipeline '{name}': {err}");
                Err(err)
            }
        }
    }

    /// Unpacks a graphics pipeline, letting `modify` adjust the resolved
    /// create-info before construction. Pipeline type, resource layout and
    /// the signature list are locked; changing them fails the unpack. The
    /// result is not memoized.
    pub fn unpack_graphics_pipeline_with<F>(
        &self,
        name: &str,
        device: &D,
        modify: F,
    ) -> Result<D::PipelineState>
    where
        F: FnOnce(&mut UnpackedGraphicsPipeline<'_, D>),
    {
        self.unpack_graphics_impl(name, device, Some(modify))
            .map_err(|err| {
                log::error!("failed to unpack graphics pipeline '{name}': {err}");
                err
            })
    }

    fn unpack_graphics_impl<F>(
        &self,
        name: &str,
        device: &D,
        modify: Option<F>,
    ) -> Result<D::PipelineState>
    where
        F: FnOnce(&mut UnpackedGraphicsPipeline<'_, D>),
    {
        let arena = DecodeArena::new();
        let (header, mut ser) = self.load_entry(
            &self.graphics_psos,
            "graphics pipeline",
            ChunkType::GraphicsPipelineStates,
            name,
            &arena,
        )?;

        let mut ci = GraphicsPipelineStateCi::default();
        codec::graphics_pso_ci(&mut ser, &mut ci)?;
        ci.desc.name = arena.alloc_str(name);
        debug_assert!(ser.is_end());

        let render_pass = if ci.render_pass_name.is_empty() {
            None
        } else {
            Some(self.unpack_render_pass(ci.render_pass_name, device)?)
        };
        let signatures = self.resolve_signatures(&ci.signature_names, device)?;

        let device_data = self.device_specific_data(&header, "graphics pipeline")?;
        let mut dev_ser = ReadSerializer::new(&device_data);
        let mut indices = Vec::new();
        codec::shader_indices(&mut dev_ser, &mut indices)?;
        debug_assert!(dev_ser.is_end());

        let shaders = self.load_shaders(&indices, device)?;

        let mut pipeline = UnpackedGraphicsPipeline {
            ci,
            render_pass,
            signatures,
            vs: None,
            ps: None,
            gs: None,
            hs: None,
            ds: None,
            amplification: None,
            mesh: None,
        };
        for loaded in shaders {
            let slot = if loaded.stage == ShaderStages::VERTEX {
                &mut pipeline.vs
            } else if loaded.stage == ShaderStages::PIXEL {
                &mut pipeline.ps
            } else if loaded.stage == ShaderStages::GEOMETRY {
                &mut pipeline.gs
            } else if loaded.stage == ShaderStages::HULL {
                &mut pipeline.hs
            } else if loaded.stage == ShaderStages::DOMAIN {
                &mut pipeline.ds
            } else if loaded.stage == ShaderStages::AMPLIFICATION {
                &mut pipeline.amplification
            } else if loaded.stage == ShaderStages::MESH {
                &mut pipeline.mesh
            } else {
                return Err(ArchiveError::DeviceConstructionFailed(format!(
                    "unsupported shader stage {:?} for a graphics pipeline",
                    loaded.stage
                )));
            };
            *slot = Some(loaded.shader);
        }

        self.finish_pipeline(pipeline, modify, device, |device, pipeline| {
            device.create_graphics_pipeline(pipeline)
        })
    }

    /// Unpacks a compute pipeline, constructing it via the device or
    /// returning the memoized object.
    pub fn unpack_compute_pipeline(&self, name: &str, device: &D) -> Result<D::PipelineState> {
        if let Some(cached) = self.compute_psos.get_cached(name) {
            return Ok(cached);
        }
        match self.unpack_compute_impl(
            name,
            device,
            None::<fn(&mut UnpackedComputePipeline<'_, D>)>,
        ) {
            Ok(pso) => {
                self.compute_psos.set_cached(name, pso.clone());
                Ok(pso)
            }
            Err(err) => {
                log::error!("failed to unpack compute pipeline '{name}': {err}");
                Err(err)
            }
        }
    }

    /// Callback variant of [`unpack_compute_pipeline`]; see
    /// [`unpack_graphics_pipeline_with`] for the lockout rules.
    ///
    /// [`unpack_compute_pipeline`]: Self::unpack_compute_pipeline
    /// [`unpack_graphics_pipeline_with`]: Self::unpack_graphics_pipeline_with
    pub fn unpack_compute_pipeline_with<F>(
        &self,
        name: &str,
        device: &D,
        modify: F,
    ) -> Result<D::PipelineState>
    where
        F: FnOnce(&mut UnpackedComputePipeline<'_, D>),
    {
        self.unpack_compute_impl(name, device, Some(modify))
            .map_err(|err| {
                log::error!("failed to unpack compute pipeline '{name}': {err}");
                err
            })
    }

    fn unpack_compute_impl<F>(
        &self,
        name: &str,
        device: &D,
        modify: Option<F>,
    ) -> Result<D::PipelineState>
    where
        F: FnOnce(&mut UnpackedComputePipeline<'_, D>),
    {
        let arena = DecodeArena::new();
        let (header, mut ser) = self.load_entry(
            &self.compute_psos,
            "compute pipeline",
            ChunkType::ComputePipelineStates,
            name,
            &arena,
        )?;

        let mut ci = ComputePipelineStateCi::default();
        codec::compute_pso_ci(&mut ser, &mut ci)?;
        ci.desc.name = arena.alloc_str(name);
        debug_assert!(ser.is_end());

        let signatures = self.resolve_signatures(&ci.signature_names, device)?;

        let device_data = self.device_specific_data(&header, "compute pipeline")?;
        let mut dev_ser = ReadSerializer::new(&device_data);
        let mut indices = Vec::new();
        codec::shader_indices(&mut dev_ser, &mut indices)?;

        let mut shaders = self.load_shaders(&indices, device)?;
        if shaders.len() != 1 || shaders[0].stage != ShaderStages::COMPUTE {
            return Err(ArchiveError::DeviceConstructionFailed(
                "a compute pipeline requires exactly one compute shader".into(),
            ));
        }
        let cs = shaders.remove(0).shader;

        let pipeline = UnpackedComputePipeline { ci, signatures, cs };
        self.finish_pipeline(pipeline, modify, device, |device, pipeline| {
            device.create_compute_pipeline(pipeline)
        })
    }

    /// Unpacks a tile pipeline, constructing it via the device or
    /// returning the memoized object.
    pub fn unpack_tile_pipeline(&self, name: &str, device: &D) -> Result<D::PipelineState> {
        if let Some(cached) = self.tile_psos.get_cached(name) {
            return Ok(cached);
        }
        match self.unpack_tile_impl(name, device, None::<fn(&mut UnpackedTilePipeline<'_, D>)>) {
            Ok(pso) => {
                self.tile_psos.set_cached(name, pso.clone());
                Ok(pso)
            }
            Err(err) => {
                log::error!("failed to unpack tile pipeline '{name}': {err}");
                Err(err)
            }
        }
    }

    /// Callback variant of [`unpack_tile_pipeline`]; see
    /// [`unpack_graphics_pipeline_with`] for the lockout rules.
    ///
    /// [`unpack_tile_pipeline`]: Self::unpack_tile_pipeline
    /// [`unpack_graphics_pipeline_with`]: Self::unpack_graphics_pipeline_with
    pub fn unpack_tile_pipeline_with<F>(
        &self,
        name: &str,
        device: &D,
        modify: F,
    ) -> Result<D::PipelineState>
    where
        F: FnOnce(&mut UnpackedTilePipeline<'_, D>),
    {
        self.unpack_tile_impl(name, device, Some(modify))
            .map_err(|err| {
                log::error!("failed to unpack tile pipeline '{name}': {err}");
                err
            })
    }

    fn unpack_tile_impl<F>(
        &self,
        name: &str,
        device: &D,
        modify: Option<F>,
    ) -> Result<D::PipelineState>
    where
        F: FnOnce(&mut UnpackedTilePipeline<'_, D>),
    {
        let arena = DecodeArena::new();
        let (header, mut ser) = self.load_entry(
            &self.tile_psos,
            "tile pipeline",
            ChunkType::TilePipelineStates,
            name,
            &arena,
        )?;

        let mut ci = TilePipelineStateCi::default();
        codec::tile_pso_ci(&mut ser, &mut ci)?;
        ci.desc.name = arena.alloc_str(name);
        debug_assert!(ser.is_end());

        let signatures = self.resolve_signatures(&ci.signature_names, device)?;

        let device_data = self.device_specific_data(&header, "tile pipeline")?;
        let mut dev_ser = ReadSerializer::new(&device_data);
        let mut indices = Vec::new();
        codec::shader_indices(&mut dev_ser, &mut indices)?;

        let mut shaders = self.load_shaders(&indices, device)?;
        if shaders.len() != 1 || shaders[0].stage != ShaderStages::TILE {
            return Err(ArchiveError::DeviceConstructionFailed(
                "a tile pipeline requires exactly one tile shader".into(),
            ));
        }
        let ts = shaders.remove(0).shader;

        let pipeline = UnpackedTilePipeline { ci, signatures, ts };
        self.finish_pipeline(pipeline, modify, device, |device, pipeline| {
            device.create_tile_pipeline(pipeline)
        })
    }

    /// Unpacks a ray-tracing pipeline, constructing it via the device or
    /// returning the memoized object.
    pub fn unpack_ray_tracing_pipeline(&self, name: &str, device: &D) -> Result<D::PipelineState> {
        if let Some(cached) = self.ray_tracing_psos.get_cached(name) {
            return Ok(cached);
        }
        match self.unpack_ray_tracing_impl(
            name,
            device,
            None::<fn(&mut UnpackedRayTracingPipeline<'_, D>)>,
        ) {
            Ok(pso) => {
                self.ray_tracing_psos.set_cached(name, pso.clone());
                Ok(pso)
            }
            Err(err) => {
                log::error!("failed to unpack ray tracing pipeline '{name}': {err}");
                Err(err)
            }
        }
    }

    /// Callback variant of [`unpack_ray_tracing_pipeline`]; see
    /// [`unpack_graphics_pipeline_with`] for the lockout rules.
    ///
    /// [`unpack_ray_tracing_pipeline`]: Self::unpack_ray_tracing_pipeline
    /// [`unpack_graphics_pipeline_with`]: Self::unpack_graphics_pipeline_with
    pub fn unpack_ray_tracing_pipeline_with<F>(
        &self,
        name: &str,
        device: &D,
        modify: F,
    ) -> Result<D::PipelineState>
    where
        F: FnOnce(&mut UnpackedRayTracingPipeline<'_, D>),
    {
        self.unpack_ray_tracing_impl(name, device, Some(modify))
            .map_err(|err| {
                log::error!("failed to unpack ray tracing pipeline '{name}': {err}");
                err
            })
    }

    fn unpack_ray_tracing_impl<F>(
        &self,
        name: &str,
        device: &D,
        modify: Option<F>,
    ) -> Result<D::PipelineState>
    where
        F: FnOnce(&mut UnpackedRayTracingPipeline<'_, D>),
    {
        let arena = DecodeArena::new();
        let (header, mut ser) = self.load_entry(
            &self.ray_tracing_psos,
            "ray tracing pipeline",
            ChunkType::RayTracingPipelineStates,
            name,
            &arena,
        )?;

        let mut ci = RayTracingPipelineStateCi::default();
        codec::ray_tracing_pso_ci(&mut ser, &mut ci)?;
        ci.desc.name = arena.alloc_str(name);
        debug_assert!(ser.is_end());

        let signatures = self.resolve_signatures(&ci.signature_names, device)?;

        let device_data = self.device_specific_data(&header, "ray tracing pipeline")?;
        let mut dev_ser = ReadSerializer::new(&device_data);
        let mut indices = Vec::new();
        codec::shader_indices(&mut dev_ser, &mut indices)?;

        let shaders = self.load_shaders(&indices, device)?;

        // Group slots hold positions in the loaded shader list;
        // NO_SHADER_INDEX is the documented "no shader" sentinel, anything
        // else out of range is corrupt data.
        let resolve = |index: u32| -> Result<Option<D::Shader>> {
            if index == NO_SHADER_INDEX {
                return Ok(None);
            }
            shaders
                .get(index as usize)
                .map(|loaded| Some(loaded.shader.clone()))
                .ok_or_else(|| {
                    ArchiveError::DecodeUnderflow(format!(
                        "ray tracing shader index {index} is out of range \
                         (pipeline loads {} shaders)",
                        shaders.len()
                    ))
                })
        };

        let mut general_shaders = Vec::with_capacity(ci.general_shaders.len());
        for group in &ci.general_shaders {
            general_shaders.push(ResolvedGeneralShaderGroup {
                name: group.name,
                shader: resolve(group.shader)?,
            });
        }
        let mut triangle_hit_shaders = Vec::with_capacity(ci.triangle_hit_shaders.len());
        for group in &ci.triangle_hit_shaders {
            triangle_hit_shaders.push(ResolvedTriangleHitShaderGroup {
                name: group.name,
                closest_hit_shader: resolve(group.closest_hit_shader)?,
                any_hit_shader: resolve(group.any_hit_shader)?,
            });
        }
        let mut procedural_hit_shaders = Vec::with_capacity(ci.procedural_hit_shaders.len());
        for group in &ci.procedural_hit_shaders {
            procedural_hit_shaders.push(ResolvedProceduralHitShaderGroup {
                name: group.name,
                intersection_shader: resolve(group.intersection_shader)?,
                closest_hit_shader: resolve(group.closest_hit_shader)?,
                any_hit_shader: resolve(group.any_hit_shader)?,
            });
        }

        let pipeline = UnpackedRayTracingPipeline {
            ci,
            signatures,
            general_shaders,
            triangle_hit_shaders,
            procedural_hit_shaders,
        };
        self.finish_pipeline(pipeline, modify, device, |device, pipeline| {
            device.create_ray_tracing_pipeline(pipeline)
        })
    }

    // --- Shared unpack tail ---

    fn resolve_signatures(
        &self,
        names: &[&str],
        device: &D,
    ) -> Result<Vec<D::ResourceSignature>> {
        names
            .iter()
            .map(|name| self.unpack_resource_signature(name, device))
            .collect()
    }

    /// Runs the mutation callback (if any), validates the locked fields,
    /// and constructs the pipeline.
    fn finish_pipeline<P, F, C>(
        &self,
        mut pipeline: P,
        modify: Option<F>,
        device: &D,
        construct: C,
    ) -> Result<D::PipelineState>
    where
        P: LockedPipelineFields<D>,
        F: FnOnce(&mut P),
        C: FnOnce(&D, &P) -> Result<D::PipelineState>,
    {
        if let Some(modify) = modify {
            let locked = pipeline.locked_snapshot();
            modify(&mut pipeline);
            pipeline.check_locked(&locked)?;
        }
        construct(device, &pipeline)
    }
}

/// Owned deep copy of a resource layout, for before/after comparison
/// around the mutation callback.
#[derive(PartialEq)]
struct LayoutSnapshot {
    default_variable_type: crate::types::ResourceVariableType,
    variables: Vec<(String, ShaderStages, crate::types::ResourceVariableType)>,
    immutable_samplers: Vec<(String, ShaderStages, u32, crate::types::SamplerDesc)>,
}

fn snapshot_layout(layout: &crate::types::ResourceLayoutDesc<'_>) -> LayoutSnapshot {
    LayoutSnapshot {
        default_variable_type: layout.default_variable_type,
        variables: layout
            .variables
            .iter()
            .map(|v| (v.name.to_owned(), v.shader_stages, v.var_type))
            .collect(),
        immutable_samplers: layout
            .immutable_samplers
            .iter()
            .map(|s| {
                (
                    s.sampler_or_texture_name.to_owned(),
                    s.shader_stages,
                    s.array_size,
                    s.desc,
                )
            })
            .collect(),
    }
}

/// Snapshot of the fields a mutation callback must not touch.
struct LockedSnapshot<D: RenderDevice> {
    pipeline_type: crate::types::PipelineType,
    resource_layout: LayoutSnapshot,
    signature_names: Vec<String>,
    signatures: Vec<D::ResourceSignature>,
}

trait LockedPipelineFields<D: RenderDevice> {
    fn desc(&self) -> &crate::types::PipelineStateDesc<'_>;
    fn signature_names(&self) -> &[&str];
    fn signatures(&self) -> &[D::ResourceSignature];

    fn locked_snapshot(&self) -> LockedSnapshot<D> {
        LockedSnapshot {
            pipeline_type: self.desc().pipeline_type,
            resource_layout: snapshot_layout(&self.desc().resource_layout),
            signature_names: self
                .signature_names()
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            signatures: self.signatures().to_vec(),
        }
    }

    fn check_locked(&self, locked: &LockedSnapshot<D>) -> Result<()> {
        if self.desc().pipeline_type != locked.pipeline_type {
            return Err(ArchiveError::IllegalModification("the pipeline type"));
        }
        if snapshot_layout(&self.desc().resource_layout) != locked.resource_layout {
            return Err(ArchiveError::IllegalModification("the resource layout"));
        }
        let names_match = self.signature_names().len() == locked.signature_names.len()
            && self
                .signature_names()
                .iter()
                .zip(locked.signature_names.iter())
                .all(|(a, b)| *a == b.as_str());
        if !names_match || self.signatures() != locked.signatures.as_slice() {
            return Err(ArchiveError::IllegalModification("the resource signatures"));
        }
        Ok(())
    }
}

impl<D: RenderDevice> LockedPipelineFields<D> for UnpackedGraphicsPipeline<'_, D> {
    fn desc(&self) -> &crate::types::PipelineStateDesc<'_> {
        &self.ci.desc
    }

    fn signature_names(&self) -> &[&str] {
        &self.ci.signature_names
    }

    fn signatures(&self) -> &[D::ResourceSignature] {
        &self.signatures
    }
}

impl<D: RenderDevice> LockedPipelineFields<D> for UnpackedComputePipeline<'_, D> {
    fn desc(&self) -> &crate::types::PipelineStateDesc<'_> {
        &self.ci.desc
    }

    fn signature_names(&self) -> &[&str] {
        &self.ci.signature_names
    }

    fn signatures(&self) -> &[D::ResourceSignature] {
        &self.signatures
    }
}

impl<D: RenderDevice> LockedPipelineFields<D> for UnpackedTilePipeline<'_, D> {
    fn desc(&self) -> &crate::types::PipelineStateDesc<'_> {
        &self.ci.desc
    }

    fn signature_names(&self) -> &[&str] {
        &self.ci.signature_names
    }

    fn signatures(&self) -> &[D::ResourceSignature] {
        &self.signatures
    }
}

impl<D: RenderDevice> LockedPipelineFields<D> for UnpackedRayTracingPipeline<'_, D> {
    fn desc(&self) -> &crate::types::PipelineStateDesc<'_> {
        &self.ci.desc
    }

    fn signature_names(&self) -> &[&str] {
        &self.ci.signature_names
    }

    fn signatures(&self) -> &[D::ResourceSignature] {
        &self.signatures
    }
}

fn read_range_from(source: &dyn ArchiveSource, offset: u64, size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; size];
    if !source.read(offset, &mut buf) {
        return Err(read_failed(offset, size));
    }
    Ok(buf)
}

/// Builds one named directory from its chunk body:
/// `u32 count` then `count x { cstr name; u32 offset; u32 size }`.
fn read_named_resources<T>(
    source: &dyn ArchiveSource,
    chunk: &ChunkHeader,
    map: &NamedResourceMap<T>,
) -> Result<()> {
    let bytes = read_range_from(source, chunk.offset as u64, chunk.size as usize)?;
    let mut ser = ReadSerializer::new(&bytes);

    let mut count = 0u32;
    ser.u32(&mut count)?;
    for _ in 0..count {
        let mut name = "";
        ser.cstr(&mut name)?;
        let mut offset = 0u32;
        ser.u32(&mut offset)?;
        let mut size = 0u32;
        ser.u32(&mut size)?;
        map.insert(name, offset, size)?;
    }
    if !ser.is_end() {
        return Err(ArchiveError::DecodeUnderflow(
            "trailing bytes in a resource directory".into(),
        ));
    }
    Ok(())
}
