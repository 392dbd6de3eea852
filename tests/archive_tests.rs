//! End-to-end archive tests: write with the serialization device, read
//! back through a mock render device.

#![allow(missing_docs)]
#![cfg(feature = "vulkan")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pipearc::device::{
    RenderDevice, UnpackedComputePipeline, UnpackedGraphicsPipeline, UnpackedRayTracingPipeline,
    UnpackedResourceSignature, UnpackedTilePipeline,
};
use pipearc::types::*;
use pipearc::{
    ArchiveError, Archiver, Backend, DataSource, DeviceFlags, DeviceObjectArchive,
    GeneralShaderGroupInfo, GraphicsPipelineArchiveInfo, RayTracingPipelineArchiveInfo,
    Result, SerializationDevice, SerializedResourceSignature, SerializedShader,
};

// --- MOCK DEVICE ---

#[derive(Debug, Clone)]
struct MockShader(Arc<MockShaderData>);

#[derive(Debug)]
struct MockShaderData {
    entry_point: String,
    #[allow(dead_code)]
    stage: ShaderStages,
}

#[derive(Debug, Clone)]
struct MockRenderPass(Arc<String>);

#[derive(Debug, Clone)]
struct MockSignature(Arc<String>);

// Identity comparison, like comparing raw object pointers: a callback may
// not swap signature objects even for an equivalent one.
impl PartialEq for MockSignature {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone)]
struct MockPipeline(Arc<MockPipelineData>);

#[derive(Debug)]
struct MockPipelineData {
    name: String,
    #[allow(dead_code)]
    kind: PipelineType,
    // (group name, entry point of the resolved shader) for ray tracing.
    general_groups: Vec<(String, Option<String>)>,
}

#[derive(Debug, Default)]
struct MockDevice {
    shader_creations: Mutex<HashMap<String, u32>>,
    pipeline_creations: Mutex<HashMap<String, u32>>,
    render_pass_dumps: Mutex<Vec<String>>,
    signature_dumps: Mutex<Vec<String>>,
}

impl MockDevice {
    fn shader_creations(&self, entry_point: &str) -> u32 {
        *self
            .shader_creations
            .lock()
            .unwrap()
            .get(entry_point)
            .unwrap_or(&0)
    }

    fn pipeline_creations(&self, name: &str) -> u32 {
        *self
            .pipeline_creations
            .lock()
            .unwrap()
            .get(name)
            .unwrap_or(&0)
    }

    fn count_pipeline(&self, name: &str) {
        *self
            .pipeline_creations
            .lock()
            .unwrap()
            .entry(name.to_owned())
            .or_insert(0) += 1;
    }
}

impl RenderDevice for MockDevice {
    type Shader = MockShader;
    type RenderPass = MockRenderPass;
    type ResourceSignature = MockSignature;
    type PipelineState = MockPipeline;

    fn create_shader(&self, ci: &ShaderCreateInfo<'_>) -> Result<MockShader> {
        *self
            .shader_creations
            .lock()
            .unwrap()
            .entry(ci.entry_point.to_owned())
            .or_insert(0) += 1;
        Ok(MockShader(Arc::new(MockShaderData {
            entry_point: ci.entry_point.to_owned(),
            stage: ci.shader_type,
        })))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc<'_>) -> Result<MockRenderPass> {
        self.render_pass_dumps.lock().unwrap().push(format!("{desc:?}"));
        Ok(MockRenderPass(Arc::new(desc.name.to_owned())))
    }

    fn create_resource_signature(
        &self,
        signature: &UnpackedResourceSignature<'_>,
    ) -> Result<MockSignature> {
        self.signature_dumps
            .lock()
            .unwrap()
            .push(format!("{:?}", signature.desc));
        Ok(MockSignature(Arc::new(signature.desc.name.to_owned())))
    }

    fn create_graphics_pipeline(
        &self,
        pipeline: &UnpackedGraphicsPipeline<'_, Self>,
    ) -> Result<MockPipeline> {
        assert!(pipeline.vs.is_some(), "graphics pipelines here carry a VS");
        self.count_pipeline(pipeline.ci.desc.name);
        Ok(MockPipeline(Arc::new(MockPipelineData {
            name: pipeline.ci.desc.name.to_owned(),
            kind: pipeline.ci.desc.pipeline_type,
            general_groups: Vec::new(),
        })))
    }

    fn create_compute_pipeline(
        &self,
        pipeline: &UnpackedComputePipeline<'_, Self>,
    ) -> Result<MockPipeline> {
        self.count_pipeline(pipeline.ci.desc.name);
        Ok(MockPipeline(Arc::new(MockPipelineData {
            name: pipeline.ci.desc.name.to_owned(),
            kind: pipeline.ci.desc.pipeline_type,
            general_groups: Vec::new(),
        })))
    }

    fn create_tile_pipeline(
        &self,
        pipeline: &UnpackedTilePipeline<'_, Self>,
    ) -> Result<MockPipeline> {
        self.count_pipeline(pipeline.ci.desc.name);
        Ok(MockPipeline(Arc::new(MockPipelineData {
            name: pipeline.ci.desc.name.to_owned(),
            kind: pipeline.ci.desc.pipeline_type,
            general_groups: Vec::new(),
        })))
    }

    fn create_ray_tracing_pipeline(
        &self,
        pipeline: &UnpackedRayTracingPipeline<'_, Self>,
    ) -> Result<MockPipeline> {
        self.count_pipeline(pipeline.ci.desc.name);
        let general_groups = pipeline
            .general_shaders
            .iter()
            .map(|group| {
                (
                    group.name.to_owned(),
                    group.shader.as_ref().map(|s| s.0.entry_point.clone()),
                )
            })
            .collect();
        Ok(MockPipeline(Arc::new(MockPipelineData {
            name: pipeline.ci.desc.name.to_owned(),
            kind: pipeline.ci.desc.pipeline_type,
            general_groups,
        })))
    }
}

// --- FIXTURES ---

fn shader(
    device: &SerializationDevice,
    stage: ShaderStages,
    entry_point: &str,
    bytecode: &[u8],
) -> SerializedShader {
    device
        .create_shader(
            &ShaderCreateInfo {
                shader_type: stage,
                entry_point,
                source_language: ShaderSourceLanguage::Hlsl,
                bytecode,
            },
            DeviceFlags::all(),
        )
        .unwrap()
}

fn globals_signature(device: &SerializationDevice) -> SerializedResourceSignature {
    device
        .create_resource_signature(
            &ResourceSignatureDesc {
                name: "Globals",
                binding_index: 0,
                resources: vec![
                    PipelineResourceDesc {
                        name: "g_Frame",
                        shader_stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
                        array_size: 1,
                        resource_type: ShaderResourceType::ConstantBuffer,
                        var_type: ResourceVariableType::Static,
                        flags: PipelineResourceFlags::empty(),
                    },
                    PipelineResourceDesc {
                        name: "g_Albedo",
                        shader_stages: ShaderStages::PIXEL,
                        array_size: 1,
                        resource_type: ShaderResourceType::TextureSrv,
                        var_type: ResourceVariableType::Mutable,
                        flags: PipelineResourceFlags::empty(),
                    },
                ],
                immutable_samplers: vec![ImmutableSamplerDesc {
                    shader_stages: ShaderStages::PIXEL,
                    sampler_or_texture_name: "g_Albedo_sampler",
                    array_size: 1,
                    desc: SamplerDesc::default(),
                }],
            },
            DeviceFlags::all(),
        )
        .unwrap()
}

fn main_pass_desc() -> RenderPassDesc<'static> {
    RenderPassDesc {
        name: "MainPass",
        attachments: vec![RenderPassAttachmentDesc {
            format: TextureFormat::Rgba8Unorm,
            sample_count: 1,
            load_op: AttachmentLoadOp::Clear,
            store_op: AttachmentStoreOp::Store,
            stencil_load_op: AttachmentLoadOp::Discard,
            stencil_store_op: AttachmentStoreOp::Discard,
            initial_state: ResourceState::empty(),
            final_state: ResourceState::PRESENT,
        }],
        subpasses: vec![SubpassDesc {
            render_targets: vec![AttachmentReference {
                attachment_index: 0,
                state: ResourceState::RENDER_TARGET,
            }],
            ..SubpassDesc::default()
        }],
        dependencies: Vec::new(),
    }
}

/// Builds an archive with two graphics pipelines sharing a vertex shader,
/// a compute pipeline, and a ray-tracing pipeline with an empty group
/// slot.
fn build_archive() -> Vec<u8> {
    let device = SerializationDevice::new();
    let signature = globals_signature(&device);
    let render_pass = device.create_render_pass(&main_pass_desc()).unwrap();

    let vs = shader(&device, ShaderStages::VERTEX, "vs_main", b"vertex bytecode");
    let ps1 = shader(&device, ShaderStages::PIXEL, "ps_gbuffer", b"gbuffer bytecode");
    let ps2 = shader(&device, ShaderStages::PIXEL, "ps_forward", b"forward bytecode");
    let cs = shader(&device, ShaderStages::COMPUTE, "cs_cull", b"cull bytecode");
    let rg = shader(&device, ShaderStages::RAY_GEN, "rg_main", b"raygen bytecode");
    let miss = shader(&device, ShaderStages::RAY_MISS, "miss_main", b"miss bytecode");

    let mut archiver = Archiver::new();

    archiver
        .add_graphics_pipeline(&GraphicsPipelineArchiveInfo {
            desc: PipelineStateDesc {
                name: "GBuffer",
                ..PipelineStateDesc::default()
            },
            graphics: GraphicsPipelineDesc {
                num_render_targets: 1,
                rtv_formats: {
                    let mut formats = [TextureFormat::Unknown; MAX_RENDER_TARGETS];
                    formats[0] = TextureFormat::Rgba8Unorm;
                    formats
                },
                ..GraphicsPipelineDesc::default()
            },
            signatures: &[&signature],
            render_pass: Some(&render_pass),
            shaders: &[&vs, &ps1],
        })
        .unwrap();

    archiver
        .add_graphics_pipeline(&GraphicsPipelineArchiveInfo {
            desc: PipelineStateDesc {
                name: "Forward",
                ..PipelineStateDesc::default()
            },
            graphics: GraphicsPipelineDesc::default(),
            signatures: &[&signature],
            render_pass: Some(&render_pass),
            shaders: &[&vs, &ps2],
        })
        .unwrap();

    archiver
        .add_compute_pipeline(&pipearc::ComputePipelineArchiveInfo {
            desc: PipelineStateDesc {
                name: "Cull",
                ..PipelineStateDesc::default()
            },
            signatures: &[&signature],
            shader: &cs,
        })
        .unwrap();

    archiver
        .add_ray_tracing_pipeline(&RayTracingPipelineArchiveInfo {
            desc: PipelineStateDesc {
                name: "RtShadows",
                ..PipelineStateDesc::default()
            },
            signatures: &[&signature],
            max_recursion_depth: 1,
            shader_record_size: 32,
            general_shaders: &[
                GeneralShaderGroupInfo {
                    name: "Main",
                    shader: Some(&rg),
                },
                GeneralShaderGroupInfo {
                    name: "Miss",
                    shader: Some(&miss),
                },
                GeneralShaderGroupInfo {
                    name: "Empty",
                    shader: None,
                },
            ],
            triangle_hit_shaders: &[],
            procedural_hit_shaders: &[],
        })
        .unwrap();

    archiver.serialize().unwrap()
}

fn open_archive(bytes: Vec<u8>) -> DeviceObjectArchive<MockDevice> {
    DeviceObjectArchive::new(Box::new(DataSource::from_bytes(bytes)), Backend::Vulkan).unwrap()
}

// --- TESTS ---

#[test]
fn write_then_read_reconstructs_everything() {
    let archive = open_archive(build_archive());
    let device = MockDevice::default();

    let gbuffer = archive.unpack_graphics_pipeline("GBuffer", &device).unwrap();
    assert_eq!(gbuffer.0.name, "GBuffer");
    let cull = archive.unpack_compute_pipeline("Cull", &device).unwrap();
    assert_eq!(cull.0.name, "Cull");

    // The render pass decoded from the archive matches what was stored.
    let dumps = device.render_pass_dumps.lock().unwrap();
    assert_eq!(dumps.len(), 1);
    assert_eq!(dumps[0], format!("{:?}", main_pass_desc()));
}

#[test]
fn decoded_signature_matches_the_stored_description() {
    let archive = open_archive(build_archive());
    let device = MockDevice::default();

    archive.unpack_resource_signature("Globals", &device).unwrap();

    let dumps = device.signature_dumps.lock().unwrap();
    assert_eq!(dumps.len(), 1);
    // Same fields as the description handed to the serialization device.
    assert!(dumps[0].contains("\"Globals\""));
    assert!(dumps[0].contains("g_Frame"));
    assert!(dumps[0].contains("g_Albedo_sampler"));
}

#[test]
fn version_mismatch_fails_construction() {
    let mut bytes = build_archive();
    // The version is the second u32 of the header.
    let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    bytes[4..8].copy_from_slice(&(version + 1).to_le_bytes());

    let result = DeviceObjectArchive::<MockDevice>::new(
        Box::new(DataSource::from_bytes(bytes)),
        Backend::Vulkan,
    );
    assert!(matches!(
        result,
        Err(ArchiveError::UnsupportedVersion { .. })
    ));
}

#[test]
fn bad_magic_fails_construction() {
    let mut bytes = build_archive();
    bytes[0..4].copy_from_slice(b"JUNK");

    let result = DeviceObjectArchive::<MockDevice>::new(
        Box::new(DataSource::from_bytes(bytes)),
        Backend::Vulkan,
    );
    assert!(matches!(result, Err(ArchiveError::BadMagic { .. })));
}

#[test]
fn duplicate_chunks_fail_construction() {
    let mut bytes = build_archive();
    // Chunk table starts right after the 36-byte header; copy the first
    // chunk's type tag over the second's.
    let first_type: [u8; 4] = bytes[36..40].try_into().unwrap();
    bytes[48..52].copy_from_slice(&first_type);

    let result = DeviceObjectArchive::<MockDevice>::new(
        Box::new(DataSource::from_bytes(bytes)),
        Backend::Vulkan,
    );
    assert!(matches!(result, Err(ArchiveError::DuplicateChunk(_))));
}

#[test]
fn unknown_chunk_types_fail_construction() {
    let mut bytes = build_archive();
    bytes[48..52].copy_from_slice(&99u32.to_le_bytes());

    let result = DeviceObjectArchive::<MockDevice>::new(
        Box::new(DataSource::from_bytes(bytes)),
        Backend::Vulkan,
    );
    assert!(matches!(result, Err(ArchiveError::UnknownChunkType(99))));
}

#[test]
fn duplicate_names_fail_construction() {
    // Two signatures whose names appear nowhere else in the file; patching
    // one directory name over the other creates a duplicate.
    let device = SerializationDevice::new();
    let make = |name: &'static str, binding_index: u8| {
        device
            .create_resource_signature(
                &ResourceSignatureDesc {
                    name,
                    binding_index,
                    resources: vec![PipelineResourceDesc {
                        name: "g_Data",
                        shader_stages: ShaderStages::COMPUTE,
                        array_size: 1,
                        resource_type: ShaderResourceType::BufferUav,
                        var_type: ResourceVariableType::Static,
                        flags: PipelineResourceFlags::empty(),
                    }],
                    immutable_samplers: Vec::new(),
                },
                DeviceFlags::all(),
            )
            .unwrap()
    };
    let mut archiver = Archiver::new();
    archiver.add_resource_signature(&make("AA", 0)).unwrap();
    archiver.add_resource_signature(&make("BB", 1)).unwrap();
    let mut bytes = archiver.serialize().unwrap();

    let needle = b"BB\0";
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("directory holds the name");
    bytes[at..at + 3].copy_from_slice(b"AA\0");

    let result = DeviceObjectArchive::<MockDevice>::new(
        Box::new(DataSource::from_bytes(bytes)),
        Backend::Vulkan,
    );
    assert!(matches!(
        result,
        Err(ArchiveError::DuplicateName(name)) if name == "AA"
    ));
}

#[test]
fn missing_resources_surface_not_found() {
    let archive = open_archive(build_archive());
    let device = MockDevice::default();

    let result = archive.unpack_graphics_pipeline("DoesNotExist", &device);
    assert!(matches!(
        result,
        Err(ArchiveError::NotFound { kind: "graphics pipeline", .. })
    ));
}

#[test]
fn backend_without_data_reports_missing_backend_data() {
    // The archive only carries Vulkan data; a D3D12 reader finds its
    // block absent.
    let device = SerializationDevice::new();
    let signature = device
        .create_resource_signature(
            &ResourceSignatureDesc {
                name: "VulkanOnly",
                binding_index: 0,
                resources: Vec::new(),
                immutable_samplers: Vec::new(),
            },
            DeviceFlags::VULKAN,
        )
        .unwrap();
    let mut archiver = Archiver::new();
    archiver.add_resource_signature(&signature).unwrap();
    let bytes = archiver.serialize().unwrap();

    let archive = DeviceObjectArchive::<MockDevice>::new(
        Box::new(DataSource::from_bytes(bytes)),
        Backend::Direct3D12,
    )
    .unwrap();
    let mock = MockDevice::default();
    let result = archive.unpack_resource_signature("VulkanOnly", &mock);
    assert!(matches!(
        result,
        Err(ArchiveError::MissingBackendData(Backend::Direct3D12))
    ));
}

#[test]
fn shared_shaders_are_constructed_once() {
    let archive = open_archive(build_archive());
    let device = MockDevice::default();

    // Both graphics pipelines reference the same vertex shader blob.
    archive.unpack_graphics_pipeline("GBuffer", &device).unwrap();
    archive.unpack_graphics_pipeline("Forward", &device).unwrap();

    assert_eq!(device.shader_creations("vs_main"), 1);
    assert_eq!(device.shader_creations("ps_gbuffer"), 1);
    assert_eq!(device.shader_creations("ps_forward"), 1);
}

#[test]
fn repeated_unpacks_hit_the_pipeline_cache() {
    let archive = open_archive(build_archive());
    let device = MockDevice::default();

    let first = archive.unpack_graphics_pipeline("GBuffer", &device).unwrap();
    let second = archive.unpack_graphics_pipeline("GBuffer", &device).unwrap();
    assert!(Arc::ptr_eq(&first.0, &second.0));
    assert_eq!(device.pipeline_creations("GBuffer"), 1);
}

#[test]
fn clear_resource_cache_forces_reconstruction() {
    let archive = open_archive(build_archive());
    let device = MockDevice::default();

    archive.unpack_graphics_pipeline("GBuffer", &device).unwrap();
    archive.clear_resource_cache();
    archive.unpack_graphics_pipeline("GBuffer", &device).unwrap();

    assert_eq!(device.shader_creations("vs_main"), 2);
    assert_eq!(device.pipeline_creations("GBuffer"), 2);
}

#[test]
fn concurrent_unpacks_agree_and_bound_construction() {
    let archive = open_archive(build_archive());
    let device = MockDevice::default();
    const THREADS: u32 = 8;

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for _ in 0..THREADS {
            handles.push(scope.spawn(|| {
                archive
                    .unpack_graphics_pipeline("GBuffer", &device)
                    .unwrap()
                    .0
                    .name
                    .clone()
            }));
        }
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "GBuffer");
        }
    });

    // Racing constructions are allowed, but never more than one per
    // thread and at least one overall.
    let creations = device.shader_creations("vs_main");
    assert!((1..=THREADS).contains(&creations));
    let pipelines = device.pipeline_creations("GBuffer");
    assert!((1..=THREADS).contains(&pipelines));
}

#[test]
fn mutation_callback_cannot_change_locked_fields() {
    let archive = open_archive(build_archive());
    let device = MockDevice::default();

    let result = archive.unpack_graphics_pipeline_with("GBuffer", &device, |pipeline| {
        pipeline.ci.desc.pipeline_type = PipelineType::Compute;
    });
    assert!(matches!(
        result,
        Err(ArchiveError::IllegalModification("the pipeline type"))
    ));
    // The failed unpack constructed no pipeline and cached nothing.
    assert_eq!(device.pipeline_creations("GBuffer"), 0);

    let result = archive.unpack_graphics_pipeline_with("GBuffer", &device, |pipeline| {
        pipeline.signatures.clear();
        pipeline.ci.signature_names.clear();
    });
    assert!(matches!(
        result,
        Err(ArchiveError::IllegalModification("the resource signatures"))
    ));
}

#[test]
fn mutation_callback_bypasses_the_cache() {
    let archive = open_archive(build_archive());
    let device = MockDevice::default();

    // Changing unlocked state is allowed, but the result is not memoized.
    archive
        .unpack_graphics_pipeline_with("GBuffer", &device, |pipeline| {
            pipeline.ci.graphics.sample_count = 4;
        })
        .unwrap();
    archive.unpack_graphics_pipeline("GBuffer", &device).unwrap();

    assert_eq!(device.pipeline_creations("GBuffer"), 2);
}

#[test]
fn ray_tracing_groups_resolve_sentinels_to_no_shader() {
    let archive = open_archive(build_archive());
    let device = MockDevice::default();

    let pipeline = archive
        .unpack_ray_tracing_pipeline("RtShadows", &device)
        .unwrap();

    let groups = &pipeline.0.general_groups;
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[0], ("Main".to_owned(), Some("rg_main".to_owned())));
    assert_eq!(groups[1], ("Miss".to_owned(), Some("miss_main".to_owned())));
    assert_eq!(groups[2], ("Empty".to_owned(), None));
}

#[test]
fn archives_round_trip_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipelines.parc");

    std::fs::write(&path, build_archive()).unwrap();

    let archive = DeviceObjectArchive::<MockDevice>::open(&path, Backend::Vulkan).unwrap();
    let device = MockDevice::default();
    let pipeline = archive.unpack_graphics_pipeline("GBuffer", &device).unwrap();
    assert_eq!(pipeline.0.name, "GBuffer");
}
