//! The archive writer.
//!
//! An [`Archiver`] collects serialized objects and pipeline descriptions,
//! then lays the file out in one pass: fixed header, chunk table, chunk
//! bodies (directories plus the shader table header), per-entry common
//! blocks, and one data block per backend. Entry offsets inside a backend
//! block are relative to that block's base; directory offsets are
//! absolute.
//!
//! Shader blobs are content-addressed: identical encoded entries collapse
//! to one shader table slot per backend, so PSOs sharing a shader share
//! its index. The per-backend blocks are independent, which lets the
//! writer build them on rayon's pool when the `parallel` feature is on.
//!
//! Archives are written once; the writer never reads anything back.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hasher;
use std::path::Path;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use twox_hash::XxHash64;

use crate::binding;
use crate::codec;
use crate::error::{ArchiveError, Result};
use crate::format::{
    ArchiveHeader, Backend, ChunkHeader, ChunkType, DataHeader, FileOffsetAndSize,
    ARCHIVE_HEADER_SIZE, CHUNK_HEADER_SIZE, HEADER_VERSION, INVALID_OFFSET, MAGIC_NUMBER,
};
use crate::serialization::{
    SerializedRenderPass, SerializedResourceSignature, SerializedShader,
};
use crate::serializer::{SerializerOps, WriteSerializer};
use crate::types::{
    GraphicsPipelineDesc, PipelineStateDesc, PipelineType, RayTracingGeneralShaderGroup,
    RayTracingProceduralHitShaderGroup, RayTracingTriangleHitShaderGroup, ShaderStages,
    TextureFormat, MAX_RENDER_TARGETS, NO_SHADER_INDEX,
};

fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        ArchiveError::DecodeUnderflow(format!("{what} exceeds the 32-bit offset range"))
    })
}

/// Graphics pipeline description for archiving.
#[derive(Clone)]
pub struct GraphicsPipelineArchiveInfo<'a> {
    /// Shared pipeline fields; the pipeline type is forced to graphics.
    pub desc: PipelineStateDesc<'a>,
    /// Fixed-function state.
    pub graphics: GraphicsPipelineDesc,
    /// Signatures in any order; ordered by binding index when stored.
    pub signatures: &'a [&'a SerializedResourceSignature],
    /// Render pass, if the pipeline uses one.
    pub render_pass: Option<&'a SerializedRenderPass>,
    /// The pipeline's shaders, one per stage.
    pub shaders: &'a [&'a SerializedShader],
}

/// Compute pipeline description for archiving.
#[derive(Clone)]
pub struct ComputePipelineArchiveInfo<'a> {
    /// Shared pipeline fields; the pipeline type is forced to compute.
    pub desc: PipelineStateDesc<'a>,
    /// Signatures in any order.
    pub signatures: &'a [&'a SerializedResourceSignature],
    /// The compute shader.
    pub shader: &'a SerializedShader,
}

/// Tile pipeline description for archiving.
#[derive(Clone)]
pub struct TilePipelineArchiveInfo<'a> {
    /// Shared pipeline fields; the pipeline type is forced to tile.
    pub desc: PipelineStateDesc<'a>,
    /// Signatures in any order.
    pub signatures: &'a [&'a SerializedResourceSignature],
    /// Number of render targets the tile shader reads.
    pub num_render_targets: u8,
    /// Render target formats.
    pub rtv_formats: [TextureFormat; MAX_RENDER_TARGETS],
    /// MSAA sample count.
    pub sample_count: u8,
    /// The tile shader.
    pub shader: &'a SerializedShader,
}

/// Ray-tracing general group for archiving.
#[derive(Clone, Copy)]
pub struct GeneralShaderGroupInfo<'a> {
    /// Group name.
    pub name: &'a str,
    /// Ray-gen / miss / callable shader, `None` for an empty slot.
    pub shader: Option<&'a SerializedShader>,
}

/// Ray-tracing triangle hit group for archiving.
#[derive(Clone, Copy)]
pub struct TriangleHitShaderGroupInfo<'a> {
    /// Group name.
    pub name: &'a str,
    /// Closest-hit shader.
    pub closest_hit_shader: Option<&'a SerializedShader>,
    /// Any-hit shader.
    pub any_hit_shader: Option<&'a SerializedShader>,
}

/// Ray-tracing procedural hit group for archiving.
#[derive(Clone, Copy)]
pub struct ProceduralHitShaderGroupInfo<'a> {
    /// Group name.
    pub name: &'a str,
    /// Intersection shader.
    pub intersection_shader: Option<&'a SerializedShader>,
    /// Closest-hit shader.
    pub closest_hit_shader: Option<&'a SerializedShader>,
    /// Any-hit shader.
    pub any_hit_shader: Option<&'a SerializedShader>,
}

/// Ray-tracing pipeline description for archiving.
#[derive(Clone)]
pub struct RayTracingPipelineArchiveInfo<'a> {
    /// Shared pipeline fields; the pipeline type is forced to ray tracing.
    pub desc: PipelineStateDesc<'a>,
    /// Signatures in any order.
    pub signatures: &'a [&'a SerializedResourceSignature],
    /// Maximum ray recursion depth.
    pub max_recursion_depth: u8,
    /// Size of one shader record in the shader binding table.
    pub shader_record_size: u16,
    /// Ray-gen, miss and callable groups.
    pub general_shaders: &'a [GeneralShaderGroupInfo<'a>],
    /// Triangle hit groups.
    pub triangle_hit_shaders: &'a [TriangleHitShaderGroupInfo<'a>],
    /// Procedural hit groups.
    pub procedural_hit_shaders: &'a [ProceduralHitShaderGroupInfo<'a>],
}

#[derive(Debug, Default)]
struct ShaderTableBuilder {
    entries: Vec<Vec<u8>>,
    dedup: HashMap<u64, u32>,
}

impl ShaderTableBuilder {
    /// Interns one encoded shader entry, collapsing identical content.
    fn intern(&mut self, encoded: Vec<u8>) -> u32 {
        let hash = content_hash(&encoded);
        if let Some(&index) = self.dedup.get(&hash) {
            if self.entries[index as usize] == encoded {
                return index;
            }
            // Hash collision with different content: append undeduplicated.
            let index = to_index(self.entries.len());
            self.entries.push(encoded);
            return index;
        }
        let index = to_index(self.entries.len());
        self.dedup.insert(hash, index);
        self.entries.push(encoded);
        index
    }
}

fn to_index(len: usize) -> u32 {
    debug_assert!(len < u32::MAX as usize);
    len as u32
}

#[derive(Debug)]
struct PipelineRecord {
    common_tail: Vec<u8>,
    shader_indices: [Option<Vec<u32>>; Backend::COUNT],
}

#[derive(Debug, Default)]
struct BackendBlock {
    bytes: Vec<u8>,
    shader_list: Option<FileOffsetAndSize>,
    signature_data: BTreeMap<String, FileOffsetAndSize>,
    pipeline_data: BTreeMap<(u32, String), FileOffsetAndSize>,
}

/// Collects serialized objects and emits the archive binary.
#[derive(Debug, Default)]
pub struct Archiver {
    signatures: BTreeMap<String, SerializedResourceSignature>,
    render_passes: BTreeMap<String, SerializedRenderPass>,
    graphics: BTreeMap<String, PipelineRecord>,
    compute: BTreeMap<String, PipelineRecord>,
    ray_tracing: BTreeMap<String, PipelineRecord>,
    tile: BTreeMap<String, PipelineRecord>,
    shader_tables: [ShaderTableBuilder; Backend::COUNT],
}

impl Archiver {
    /// Creates an empty archiver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a signature under its name. Re-registering the identical
    /// signature is a no-op; a different signature under the same name is
    /// rejected.
    pub fn add_resource_signature(
        &mut self,
        signature: &SerializedResourceSignature,
    ) -> Result<()> {
        if let Some(existing) = self.signatures.get(signature.name()) {
            if existing == signature {
                return Ok(());
            }
            return Err(ArchiveError::DuplicateName(signature.name().to_owned()));
        }
        self.signatures
            .insert(signature.name().to_owned(), signature.clone());
        Ok(())
    }

    /// Registers a render pass under its name, with the same re-add rules
    /// as [`add_resource_signature`](Self::add_resource_signature).
    pub fn add_render_pass(&mut self, render_pass: &SerializedRenderPass) -> Result<()> {
        if let Some(existing) = self.render_passes.get(render_pass.name()) {
            if existing == render_pass {
                return Ok(());
            }
            return Err(ArchiveError::DuplicateName(render_pass.name().to_owned()));
        }
        self.render_passes
            .insert(render_pass.name().to_owned(), render_pass.clone());
        Ok(())
    }

    /// Orders signatures by binding index, validating density, and
    /// registers them.
    fn register_signature_set<'a>(
        &mut self,
        signatures: &[&'a SerializedResourceSignature],
    ) -> Result<Vec<&'a SerializedResourceSignature>> {
        let views: Vec<_> = signatures.iter().map(|s| s.view()).collect();
        let sorted_views = binding::sort_signatures(&views)?;

        let mut ordered = Vec::with_capacity(sorted_views.len());
        for view in &sorted_views {
            let sig = signatures
                .iter()
                .find(|s| s.binding_index() == view.binding_index)
                .expect("sorted views come from this signature set");
            self.add_resource_signature(sig)?;
            ordered.push(*sig);
        }
        Ok(ordered)
    }

    /// Interns every shader for every backend it carries data for. A
    /// backend slot is populated only when all shaders are available
    /// there.
    fn intern_shaders(
        &mut self,
        shaders: &[&SerializedShader],
    ) -> Result<[Option<Vec<u32>>; Backend::COUNT]> {
        let mut out: [Option<Vec<u32>>; Backend::COUNT] = Default::default();
        if shaders.is_empty() {
            return Ok(out);
        }

        for backend in Backend::ALL {
            let mut encoded = Vec::with_capacity(shaders.len());
            for shader in shaders {
                match shader.encode_entry(backend)? {
                    Some(entry) => encoded.push(entry),
                    None => {
                        encoded.clear();
                        break;
                    }
                }
            }
            if encoded.is_empty() {
                continue;
            }
            let table = &mut self.shader_tables[backend.index()];
            out[backend.index()] = Some(encoded.into_iter().map(|e| table.intern(e)).collect());
        }
        Ok(out)
    }

    /// Adds a graphics pipeline along with its signatures, render pass
    /// and shaders.
    pub fn add_graphics_pipeline(&mut self, info: &GraphicsPipelineArchiveInfo<'_>) -> Result<()> {
        if self.graphics.contains_key(info.desc.name) {
            return Err(ArchiveError::DuplicateName(info.desc.name.to_owned()));
        }
        if info.shaders.is_empty() {
            return Err(ArchiveError::DeviceConstructionFailed(
                "a graphics pipeline requires at least one shader".into(),
            ));
        }
        for shader in info.shaders {
            if !ShaderStages::ALL_GRAPHICS.contains(shader.stage()) {
                return Err(ArchiveError::DeviceConstructionFailed(format!(
                    "shader stage {:?} cannot be part of a graphics pipeline",
                    shader.stage()
                )));
            }
        }

        let ordered = self.register_signature_set(info.signatures)?;
        let signature_names: Vec<&str> = ordered.iter().map(|s| s.name()).collect();
        let render_pass_name = match info.render_pass {
            Some(render_pass) => {
                self.add_render_pass(render_pass)?;
                render_pass.name()
            }
            None => "",
        };

        let mut ci = codec::GraphicsPipelineStateCi {
            desc: PipelineStateDesc {
                name: "",
                pipeline_type: PipelineType::Graphics,
                resource_layout: info.desc.resource_layout.clone(),
            },
            graphics: info.graphics.clone(),
            signature_names,
            render_pass_name,
        };
        let mut writer = WriteSerializer::new();
        codec::graphics_pso_ci(&mut writer, &mut ci)?;

        let shader_indices = self.intern_shaders(info.shaders)?;
        self.graphics.insert(
            info.desc.name.to_owned(),
            PipelineRecord {
                common_tail: writer.into_vec(),
                shader_indices,
            },
        );
        Ok(())
    }

    /// Adds a compute pipeline along with its signatures and shader.
    pub fn add_compute_pipeline(&mut self, info: &ComputePipelineArchiveInfo<'_>) -> Result<()> {
        if self.compute.contains_key(info.desc.name) {
            return Err(ArchiveError::DuplicateName(info.desc.name.to_owned()));
        }
        if info.shader.stage() != ShaderStages::COMPUTE {
            return Err(ArchiveError::DeviceConstructionFailed(
                "a compute pipeline requires a compute shader".into(),
            ));
        }

        let ordered = self.register_signature_set(info.signatures)?;
        let signature_names: Vec<&str> = ordered.iter().map(|s| s.name()).collect();

        let mut ci = codec::ComputePipelineStateCi {
            desc: PipelineStateDesc {
                name: "",
                pipeline_type: PipelineType::Compute,
                resource_layout: info.desc.resource_layout.clone(),
            },
            signature_names,
        };
        let mut writer = WriteSerializer::new();
        codec::compute_pso_ci(&mut writer, &mut ci)?;

        let shader_indices = self.intern_shaders(&[info.shader])?;
        self.compute.insert(
            info.desc.name.to_owned(),
            PipelineRecord {
                common_tail: writer.into_vec(),
                shader_indices,
            },
        );
        Ok(())
    }

    /// Adds a tile pipeline along with its signatures and shader.
    pub fn add_tile_pipeline(&mut self, info: &TilePipelineArchiveInfo<'_>) -> Result<()> {
        if self.tile.contains_key(info.desc.name) {
            return Err(ArchiveError::DuplicateName(info.desc.name.to_owned()));
        }
        if info.shader.stage() != ShaderStages::TILE {
            return Err(ArchiveError::DeviceConstructionFailed(
                "a tile pipeline requires a tile shader".into(),
            ));
        }

        let ordered = self.register_signature_set(info.signatures)?;
        let signature_names: Vec<&str> = ordered.iter().map(|s| s.name()).collect();

        let mut ci = codec::TilePipelineStateCi {
            desc: PipelineStateDesc {
                name: "",
                pipeline_type: PipelineType::Tile,
                resource_layout: info.desc.resource_layout.clone(),
            },
            signature_names,
            num_render_targets: info.num_render_targets,
            rtv_formats: info.rtv_formats,
            sample_count: info.sample_count,
        };
        let mut writer = WriteSerializer::new();
        codec::tile_pso_ci(&mut writer, &mut ci)?;

        let shader_indices = self.intern_shaders(&[info.shader])?;
        self.tile.insert(
            info.desc.name.to_owned(),
            PipelineRecord {
                common_tail: writer.into_vec(),
                shader_indices,
            },
        );
        Ok(())
    }

    /// Adds a ray-tracing pipeline. Group shader slots become positions in
    /// the pipeline's shader list, with the empty-slot sentinel for absent
    /// shaders.
    pub fn add_ray_tracing_pipeline(
        &mut self,
        info: &RayTracingPipelineArchiveInfo<'_>,
    ) -> Result<()> {
        if self.ray_tracing.contains_key(info.desc.name) {
            return Err(ArchiveError::DuplicateName(info.desc.name.to_owned()));
        }

        // Unique shaders in first-seen order; group slots reference
        // positions in this list.
        let mut list: Vec<&SerializedShader> = Vec::new();
        fn position<'s>(
            list: &mut Vec<&'s SerializedShader>,
            shader: Option<&'s SerializedShader>,
        ) -> u32 {
            match shader {
                None => NO_SHADER_INDEX,
                Some(shader) => {
                    if let Some(at) = list.iter().position(|s| std::ptr::eq(*s, shader)) {
                        at as u32
                    } else {
                        list.push(shader);
                        (list.len() - 1) as u32
                    }
                }
            }
        }

        let general_shaders: Vec<RayTracingGeneralShaderGroup<'_>> = info
            .general_shaders
            .iter()
            .map(|g| RayTracingGeneralShaderGroup {
                name: g.name,
                shader: position(&mut list, g.shader),
            })
            .collect();
        let triangle_hit_shaders: Vec<RayTracingTriangleHitShaderGroup<'_>> = info
            .triangle_hit_shaders
            .iter()
            .map(|g| RayTracingTriangleHitShaderGroup {
                name: g.name,
                closest_hit_shader: position(&mut list, g.closest_hit_shader),
                any_hit_shader: position(&mut list, g.any_hit_shader),
            })
            .collect();
        let procedural_hit_shaders: Vec<RayTracingProceduralHitShaderGroup<'_>> = info
            .procedural_hit_shaders
            .iter()
            .map(|g| RayTracingProceduralHitShaderGroup {
                name: g.name,
                intersection_shader: position(&mut list, g.intersection_shader),
                closest_hit_shader: position(&mut list, g.closest_hit_shader),
                any_hit_shader: position(&mut list, g.any_hit_shader),
            })
            .collect();

        if list.is_empty() {
            return Err(ArchiveError::DeviceConstructionFailed(
                "a ray tracing pipeline requires at least one shader".into(),
            ));
        }

        let ordered = self.register_signature_set(info.signatures)?;
        let signature_names: Vec<&str> = ordered.iter().map(|s| s.name()).collect();

        let mut ci = codec::RayTracingPipelineStateCi {
            desc: PipelineStateDesc {
                name: "",
                pipeline_type: PipelineType::RayTracing,
                resource_layout: info.desc.resource_layout.clone(),
            },
            signature_names,
            max_recursion_depth: info.max_recursion_depth,
            shader_record_size: info.shader_record_size,
            general_shaders,
            triangle_hit_shaders,
            procedural_hit_shaders,
        };
        let mut writer = WriteSerializer::new();
        codec::ray_tracing_pso_ci(&mut writer, &mut ci)?;

        let shader_indices = self.intern_shaders(&list)?;
        self.ray_tracing.insert(
            info.desc.name.to_owned(),
            PipelineRecord {
                common_tail: writer.into_vec(),
                shader_indices,
            },
        );
        Ok(())
    }

    // --- Emission ---

    fn build_backend_block(&self, backend: Backend) -> Result<BackendBlock> {
        let mut block = BackendBlock::default();

        let table = &self.shader_tables[backend.index()];
        if !table.entries.is_empty() {
            let mut ranges = Vec::with_capacity(table.entries.len());
            for entry in &table.entries {
                let offset = to_u32(block.bytes.len(), "backend block")?;
                block.bytes.extend_from_slice(entry);
                ranges.push(FileOffsetAndSize {
                    offset,
                    size: to_u32(entry.len(), "shader entry")?,
                });
            }

            let list_offset = to_u32(block.bytes.len(), "backend block")?;
            let mut writer = WriteSerializer::new();
            let mut count = to_u32(ranges.len(), "shader table")?;
            writer.u32(&mut count)?;
            for mut range in ranges {
                writer.pod(&mut range)?;
            }
            let list = writer.into_vec();
            block.shader_list = Some(FileOffsetAndSize {
                offset: list_offset,
                size: to_u32(list.len(), "shader list")?,
            });
            block.bytes.extend_from_slice(&list);
        }

        for (name, signature) in &self.signatures {
            if let Some(bytes) = binding::encode_attribs(signature.backend_data(), backend)? {
                let offset = to_u32(block.bytes.len(), "backend block")?;
                block.bytes.extend_from_slice(&bytes);
                block.signature_data.insert(
                    name.clone(),
                    FileOffsetAndSize {
                        offset,
                        size: to_u32(bytes.len(), "signature attributes")?,
                    },
                );
            }
        }

        let kinds = [
            (ChunkType::GraphicsPipelineStates, &self.graphics),
            (ChunkType::ComputePipelineStates, &self.compute),
            (ChunkType::RayTracingPipelineStates, &self.ray_tracing),
            (ChunkType::TilePipelineStates, &self.tile),
        ];
        for (kind, pipelines) in kinds {
            for (name, record) in pipelines.iter() {
                let Some(indices) = &record.shader_indices[backend.index()] else {
                    continue;
                };
                let mut writer = WriteSerializer::new();
                let mut copy = indices.clone();
                codec::shader_indices(&mut writer, &mut copy)?;
                let bytes = writer.into_vec();

                let offset = to_u32(block.bytes.len(), "backend block")?;
                block.bytes.extend_from_slice(&bytes);
                block.pipeline_data.insert(
                    (kind as u32, name.clone()),
                    FileOffsetAndSize {
                        offset,
                        size: to_u32(bytes.len(), "shader index list")?,
                    },
                );
            }
        }

        Ok(block)
    }

    fn entry_bytes<F>(&self, kind: ChunkType, tail: &[u8], lookup: F) -> Vec<u8>
    where
        F: Fn(Backend) -> Option<FileOffsetAndSize>,
    {
        let mut header = DataHeader::new(kind);
        for backend in Backend::ALL {
            if let Some(range) = lookup(backend) {
                header.set_range(backend, range.offset, range.size);
            }
        }
        let mut bytes = bytemuck::bytes_of(&header).to_vec();
        bytes.extend_from_slice(tail);
        bytes
    }

    /// Lays out and emits the archive bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        // Backend blocks are independent of each other and of the common
        // region; build them concurrently.
        #[cfg(feature = "parallel")]
        let blocks: Vec<BackendBlock> = Backend::ALL
            .par_iter()
            .map(|&backend| self.build_backend_block(backend))
            .collect::<Result<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let blocks: Vec<BackendBlock> = Backend::ALL
            .iter()
            .map(|&backend| self.build_backend_block(backend))
            .collect::<Result<Vec<_>>>()?;

        // Common entry bytes per kind, in directory order.
        let signature_entries: Vec<(&str, Vec<u8>)> = self
            .signatures
            .iter()
            .map(|(name, sig)| {
                let bytes =
                    self.entry_bytes(ChunkType::ResourceSignature, sig.common_tail(), |b| {
                        blocks[b.index()].signature_data.get(name).copied()
                    });
                (name.as_str(), bytes)
            })
            .collect();
        let render_pass_entries: Vec<(&str, Vec<u8>)> = self
            .render_passes
            .iter()
            .map(|(name, rp)| {
                let bytes = self.entry_bytes(ChunkType::RenderPass, rp.common_tail(), |_| None);
                (name.as_str(), bytes)
            })
            .collect();

        let pso_entries = |kind: ChunkType, map: &BTreeMap<String, PipelineRecord>| {
            map.iter()
                .map(|(name, record)| {
                    let bytes = self.entry_bytes(kind, &record.common_tail, |b| {
                        blocks[b.index()]
                            .pipeline_data
                            .get(&(kind as u32, name.clone()))
                            .copied()
                    });
                    (name.to_owned(), bytes)
                })
                .collect::<Vec<(String, Vec<u8>)>>()
        };
        let graphics_entries = pso_entries(ChunkType::GraphicsPipelineStates, &self.graphics);
        let compute_entries = pso_entries(ChunkType::ComputePipelineStates, &self.compute);
        let ray_tracing_entries =
            pso_entries(ChunkType::RayTracingPipelineStates, &self.ray_tracing);
        let tile_entries = pso_entries(ChunkType::TilePipelineStates, &self.tile);

        // Directory descriptions: chunk type plus (name, entry bytes).
        let mut directories: Vec<(ChunkType, Vec<(&str, &[u8])>)> = Vec::new();

        let signature_dir: Vec<(&str, &[u8])> = signature_entries
            .iter()
            .map(|(n, b)| (*n, b.as_slice()))
            .collect();
        let graphics_dir: Vec<(&str, &[u8])> = graphics_entries
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        let compute_dir: Vec<(&str, &[u8])> = compute_entries
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        let ray_tracing_dir: Vec<(&str, &[u8])> = ray_tracing_entries
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        let tile_dir: Vec<(&str, &[u8])> = tile_entries
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_slice()))
            .collect();
        let render_pass_dir: Vec<(&str, &[u8])> = render_pass_entries
            .iter()
            .map(|(n, b)| (*n, b.as_slice()))
            .collect();

        if !signature_dir.is_empty() {
            directories.push((ChunkType::ResourceSignature, signature_dir));
        }
        if !graphics_dir.is_empty() {
            directories.push((ChunkType::GraphicsPipelineStates, graphics_dir));
        }
        if !compute_dir.is_empty() {
            directories.push((ChunkType::ComputePipelineStates, compute_dir));
        }
        if !ray_tracing_dir.is_empty() {
            directories.push((ChunkType::RayTracingPipelineStates, ray_tracing_dir));
        }
        if !tile_dir.is_empty() {
            directories.push((ChunkType::TilePipelineStates, tile_dir));
        }
        if !render_pass_dir.is_empty() {
            directories.push((ChunkType::RenderPass, render_pass_dir));
        }

        // Debug info body.
        let debug_body = {
            let mut writer = WriteSerializer::new();
            let mut api_version = env!("CARGO_PKG_VERSION");
            let mut commit_hash = option_env!("PIPEARC_COMMIT_HASH").unwrap_or("");
            codec::debug_info(&mut writer, &mut api_version, &mut commit_hash)?;
            writer.into_vec()
        };

        let have_shaders = blocks.iter().any(|b| b.shader_list.is_some());

        // Chunk count: debug info, one per non-empty directory, shaders.
        let num_chunks = 1 + directories.len() + usize::from(have_shaders);
        let mut cursor = ARCHIVE_HEADER_SIZE + num_chunks * CHUNK_HEADER_SIZE;

        let debug_chunk_offset = cursor;
        cursor += debug_body.len();

        // Directory bodies have fixed-size entries, so their sizes are
        // known before the entry offsets they contain are.
        let mut directory_offsets = Vec::with_capacity(directories.len());
        for (_, entries) in &directories {
            directory_offsets.push(cursor);
            cursor += 4 + entries
                .iter()
                .map(|(name, _)| name.len() + 1 + 8)
                .sum::<usize>();
        }

        let shaders_chunk_offset = cursor;
        if have_shaders {
            cursor += std::mem::size_of::<DataHeader>();
        }

        // Common entry blocks.
        let mut entry_offsets: HashMap<(u32, String), (u32, u32)> = HashMap::new();
        for (kind, entries) in &directories {
            for (name, bytes) in entries {
                entry_offsets.insert(
                    (*kind as u32, (*name).to_owned()),
                    (to_u32(cursor, "archive")?, to_u32(bytes.len(), "entry")?),
                );
                cursor += bytes.len();
            }
        }

        // Backend blocks.
        let mut block_base_offsets = [INVALID_OFFSET; Backend::COUNT];
        for (backend, block) in Backend::ALL.iter().zip(blocks.iter()) {
            if block.bytes.is_empty() {
                continue;
            }
            block_base_offsets[backend.index()] = to_u32(cursor, "archive")?;
            cursor += block.bytes.len();
        }

        // Emit.
        let mut out = Vec::with_capacity(cursor);

        let header = ArchiveHeader {
            magic: MAGIC_NUMBER,
            version: HEADER_VERSION,
            num_chunks: to_u32(num_chunks, "chunk table")?,
            block_base_offsets,
        };
        out.extend_from_slice(bytemuck::bytes_of(&header));

        let mut push_chunk = |out: &mut Vec<u8>, ty: ChunkType, size: usize, offset: usize| {
            let chunk = ChunkHeader {
                chunk_type: ty as u32,
                size: size as u32,
                offset: offset as u32,
            };
            out.extend_from_slice(bytemuck::bytes_of(&chunk));
        };
        push_chunk(
            &mut out,
            ChunkType::ArchiveDebugInfo,
            debug_body.len(),
            debug_chunk_offset,
        );
        for ((kind, entries), dir_offset) in directories.iter().zip(directory_offsets.iter()) {
            let size = 4 + entries
                .iter()
                .map(|(name, _)| name.len() + 1 + 8)
                .sum::<usize>();
            push_chunk(&mut out, *kind, size, *dir_offset);
        }
        if have_shaders {
            push_chunk(
                &mut out,
                ChunkType::Shaders,
                std::mem::size_of::<DataHeader>(),
                shaders_chunk_offset,
            );
        }

        // Bodies.
        out.extend_from_slice(&debug_body);
        for (kind, entries) in &directories {
            let mut writer = WriteSerializer::new();
            let mut count = to_u32(entries.len(), "directory")?;
            writer.u32(&mut count)?;
            for (name, _) in entries {
                let (mut offset, mut size) = entry_offsets[&(*kind as u32, (*name).to_owned())];
                let mut name_ref = *name;
                writer.cstr(&mut name_ref)?;
                writer.u32(&mut offset)?;
                writer.u32(&mut size)?;
            }
            out.extend_from_slice(&writer.into_vec());
        }
        if have_shaders {
            let mut header = DataHeader::new(ChunkType::Shaders);
            for (backend, block) in Backend::ALL.iter().zip(blocks.iter()) {
                if let Some(list) = block.shader_list {
                    header.set_range(*backend, list.offset, list.size);
                }
            }
            out.extend_from_slice(bytemuck::bytes_of(&header));
        }

        // Common entries.
        for (_, entries) in &directories {
            for (_, bytes) in entries {
                out.extend_from_slice(bytes);
            }
        }

        // Backend blocks.
        for block in &blocks {
            out.extend_from_slice(&block.bytes);
        }

        debug_assert_eq!(out.len(), cursor);
        Ok(out)
    }

    /// Serializes the archive and writes it to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.serialize()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
