//! Write-side façade: the serialization device.
//!
//! A [`SerializationDevice`] plays the role of a rendering device for the
//! offline path. It does not talk to any API; it validates descriptions,
//! computes per-backend binding attributes, and produces the serialized
//! objects ([`SerializedShader`], [`SerializedRenderPass`],
//! [`SerializedResourceSignature`]) that an
//! [`Archiver`](crate::archiver::Archiver) packs into an archive.
//!
//! Shader compilation is external: callers hand the device compiled
//! bytecode. One blob may serve every requested backend, or
//! [`SerializedShader::set_backend_bytecode`] installs per-backend
//! artifacts.

use crate::binding::{
    self, BackendSignatureData, PipelineResourceBinding, SignatureResource, SignatureSampler,
    SignatureView,
};
use crate::codec;
use crate::error::{ArchiveError, Result};
use crate::format::{Backend, DeviceFlags};
use crate::serializer::WriteSerializer;
use crate::types::{
    RenderPassDesc, ResourceSignatureDesc, ShaderCreateInfo, ShaderSourceLanguage, ShaderStages,
};

/// Backends compiled into this build, as a device flag mask.
pub fn valid_device_flags() -> DeviceFlags {
    let mut flags = DeviceFlags::empty();
    #[cfg(feature = "d3d11")]
    {
        flags |= DeviceFlags::D3D11;
    }
    #[cfg(feature = "d3d12")]
    {
        flags |= DeviceFlags::D3D12;
    }
    #[cfg(feature = "opengl")]
    {
        flags |= DeviceFlags::OPEN_GL;
    }
    #[cfg(feature = "vulkan")]
    {
        flags |= DeviceFlags::VULKAN;
    }
    #[cfg(feature = "metal")]
    {
        flags |= DeviceFlags::METAL_IOS | DeviceFlags::METAL_MACOS;
    }
    flags
}

/// A shader ready to be packed: description plus per-backend bytecode.
#[derive(Debug, Clone)]
pub struct SerializedShader {
    stage: ShaderStages,
    entry_point: String,
    source_language: ShaderSourceLanguage,
    bytecode: [Option<Vec<u8>>; Backend::COUNT],
}

impl SerializedShader {
    /// The shader's stage.
    pub fn stage(&self) -> ShaderStages {
        self.stage
    }

    /// Entry point name.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Source language the bytecode was compiled from.
    pub fn source_language(&self) -> ShaderSourceLanguage {
        self.source_language
    }

    /// Bytecode carried for `backend`, if any.
    pub fn backend_bytecode(&self, backend: Backend) -> Option<&[u8]> {
        self.bytecode[backend.index()].as_deref()
    }

    /// Replaces the artifact carried for one backend, for callers that
    /// compile per-backend variants externally.
    pub fn set_backend_bytecode(&mut self, backend: Backend, bytecode: Vec<u8>) {
        self.bytecode[backend.index()] = Some(bytecode);
    }

    /// Encodes the shader table entry for one backend, or `None` when the
    /// shader carries no artifact for it.
    pub(crate) fn encode_entry(&self, backend: Backend) -> Result<Option<Vec<u8>>> {
        let Some(bytecode) = self.backend_bytecode(backend) else {
            return Ok(None);
        };
        let mut ci = ShaderCreateInfo {
            shader_type: self.stage,
            entry_point: &self.entry_point,
            source_language: self.source_language,
            bytecode,
        };
        let mut writer = WriteSerializer::new();
        codec::shader_create_info(&mut writer, &mut ci)?;
        Ok(Some(writer.into_vec()))
    }
}

/// A render pass ready to be packed: the name and the encoded descriptor
/// tail. Render passes are backend-agnostic and carry no backend data.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedRenderPass {
    name: String,
    common_tail: Vec<u8>,
}

impl SerializedRenderPass {
    /// Render pass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn common_tail(&self) -> &[u8] {
        &self.common_tail
    }
}

/// A resource signature ready to be packed: the encoded descriptor tail
/// plus the binding attributes computed for every requested backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedResourceSignature {
    name: String,
    binding_index: u8,
    device_flags: DeviceFlags,
    common_tail: Vec<u8>,
    resources: Vec<SignatureResource>,
    immutable_samplers: Vec<SignatureSampler>,
    backend_data: BackendSignatureData,
}

impl SerializedResourceSignature {
    /// Signature name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position within a pipeline's signature set.
    pub fn binding_index(&self) -> u8 {
        self.binding_index
    }

    /// Backends this signature carries attributes for.
    pub fn device_flags(&self) -> DeviceFlags {
        self.device_flags
    }

    /// Declared resources, in emission order.
    pub fn resources(&self) -> &[SignatureResource] {
        &self.resources
    }

    pub(crate) fn common_tail(&self) -> &[u8] {
        &self.common_tail
    }

    pub(crate) fn backend_data(&self) -> &BackendSignatureData {
        &self.backend_data
    }

    pub(crate) fn view(&self) -> SignatureView<'_> {
        SignatureView {
            binding_index: self.binding_index,
            resources: &self.resources,
            immutable_samplers: &self.immutable_samplers,
            data: &self.backend_data,
        }
    }
}

/// Input of [`SerializationDevice::get_pipeline_resource_bindings`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineResourceBindingAttribs<'a> {
    /// The pipeline's signatures, in any order; their binding indices must
    /// densely fill `[0, N)`.
    pub signatures: &'a [&'a SerializedResourceSignature],
    /// Backend to compute bindings for.
    pub backend: Backend,
    /// Stage mask restricting emission; empty means all stages.
    pub shader_stages: ShaderStages,
    /// Bound render target count; only D3D11 consumes it.
    pub num_render_targets: u32,
}

/// Write-side device producing the objects an archive serializes.
#[derive(Debug, Default)]
pub struct SerializationDevice {
    resource_bindings: Vec<PipelineResourceBinding>,
}

impl SerializationDevice {
    /// Creates a serialization device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backends this build can serialize for.
    pub fn valid_device_flags(&self) -> DeviceFlags {
        valid_device_flags()
    }

    fn effective_flags(&self, requested: DeviceFlags) -> Result<DeviceFlags> {
        let effective = requested & self.valid_device_flags();
        if effective.is_empty() {
            return Err(ArchiveError::DeviceConstructionFailed(format!(
                "none of the requested backends ({requested:?}) are compiled in"
            )));
        }
        Ok(effective)
    }

    /// Creates a shader carrying `ci.bytecode` for every backend in
    /// `device_flags`. Per-backend artifacts can be installed afterwards
    /// with [`SerializedShader::set_backend_bytecode`].
    pub fn create_shader(
        &self,
        ci: &ShaderCreateInfo<'_>,
        device_flags: DeviceFlags,
    ) -> Result<SerializedShader> {
        if ci.shader_type.bits().count_ones() != 1 {
            return Err(ArchiveError::DeviceConstructionFailed(format!(
                "a shader must have exactly one stage, got {:?}",
                ci.shader_type
            )));
        }
        let flags = self.effective_flags(device_flags)?;

        let mut bytecode: [Option<Vec<u8>>; Backend::COUNT] = Default::default();
        for backend in Backend::ALL {
            if flags.contains(backend.into()) {
                bytecode[backend.index()] = Some(ci.bytecode.to_vec());
            }
        }
        Ok(SerializedShader {
            stage: ci.shader_type,
            entry_point: ci.entry_point.to_owned(),
            source_language: ci.source_language,
            bytecode,
        })
    }

    /// Creates a render pass object from its description.
    pub fn create_render_pass(&self, desc: &RenderPassDesc<'_>) -> Result<SerializedRenderPass> {
        let mut copy = desc.clone();
        let mut writer = WriteSerializer::new();
        codec::render_pass_desc(&mut writer, &mut copy)?;
        Ok(SerializedRenderPass {
            name: desc.name.to_owned(),
            common_tail: writer.into_vec(),
        })
    }

    /// Creates a resource signature, computing binding attributes for
    /// every backend in `device_flags`.
    pub fn create_resource_signature(
        &self,
        desc: &ResourceSignatureDesc<'_>,
        device_flags: DeviceFlags,
    ) -> Result<SerializedResourceSignature> {
        let flags = self.effective_flags(device_flags)?;

        let mut data = BackendSignatureData::default();
        #[cfg(feature = "d3d11")]
        if flags.contains(DeviceFlags::D3D11) {
            data.d3d11 = Some(binding::d3d11::assign(desc)?);
        }
        #[cfg(feature = "d3d12")]
        if flags.contains(DeviceFlags::D3D12) {
            data.d3d12 = Some(binding::d3d12::assign(desc)?);
        }
        #[cfg(feature = "opengl")]
        if flags.contains(DeviceFlags::OPEN_GL) {
            data.gl = Some(binding::gl::assign(desc)?);
        }
        #[cfg(feature = "vulkan")]
        if flags.contains(DeviceFlags::VULKAN) {
            data.vulkan = Some(binding::vulkan::assign(desc)?);
        }
        #[cfg(feature = "metal")]
        if flags.intersects(DeviceFlags::METAL_IOS | DeviceFlags::METAL_MACOS) {
            data.metal = Some(binding::metal::assign(desc)?);
        }

        let mut copy = desc.clone();
        let mut writer = WriteSerializer::new();
        codec::signature_desc(&mut writer, &mut copy)?;

        Ok(SerializedResourceSignature {
            name: desc.name.to_owned(),
            binding_index: desc.binding_index,
            device_flags: flags,
            common_tail: writer.into_vec(),
            resources: desc
                .resources
                .iter()
                .map(|r| SignatureResource {
                    name: r.name.to_owned(),
                    shader_stages: r.shader_stages,
                    array_size: r.array_size,
                    resource_type: r.resource_type,
                    var_type: r.var_type,
                    flags: r.flags,
                })
                .collect(),
            immutable_samplers: desc
                .immutable_samplers
                .iter()
                .map(|s| SignatureSampler {
                    name: s.sampler_or_texture_name.to_owned(),
                    shader_stages: s.shader_stages,
                    array_size: s.array_size,
                })
                .collect(),
            backend_data: data,
        })
    }

    /// Computes the bindings a pipeline built from the given signature set
    /// will use on the given backend (the read-side assignment rules,
    /// exposed so offline callers can preview binding layouts).
    ///
    /// The returned slice aliases a buffer owned by this device and is
    /// valid until the next call; copy it for longer retention.
    pub fn get_pipeline_resource_bindings(
        &mut self,
        attribs: &PipelineResourceBindingAttribs<'_>,
    ) -> Result<&[PipelineResourceBinding]> {
        self.resource_bindings.clear();

        let views: Vec<SignatureView<'_>> =
            attribs.signatures.iter().map(|sig| sig.view()).collect();
        binding::emit_bindings(
            &views,
            attribs.backend,
            attribs.shader_stages,
            attribs.num_render_targets,
            &mut self.resource_bindings,
        )?;
        Ok(&self.resource_bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "vulkan")]
    use crate::types::{
        PipelineResourceDesc, PipelineResourceFlags, ResourceVariableType, ShaderResourceType,
    };

    #[cfg(feature = "vulkan")]
    fn sample_signature_desc() -> ResourceSignatureDesc<'static> {
        ResourceSignatureDesc {
            name: "Material",
            binding_index: 0,
            resources: vec![PipelineResourceDesc {
                name: "g_Albedo",
                shader_stages: ShaderStages::PIXEL,
                array_size: 1,
                resource_type: ShaderResourceType::TextureSrv,
                var_type: ResourceVariableType::Mutable,
                flags: PipelineResourceFlags::empty(),
            }],
            immutable_samplers: Vec::new(),
        }
    }

    #[test]
    fn valid_flags_reflect_compiled_backends() {
        let device = SerializationDevice::new();
        let flags = device.valid_device_flags();
        #[cfg(feature = "vulkan")]
        assert!(flags.contains(DeviceFlags::VULKAN));
        #[cfg(feature = "d3d12")]
        assert!(flags.contains(DeviceFlags::D3D12));
        assert!(!flags.is_empty());
    }

    #[test]
    fn shaders_require_a_single_stage() {
        let device = SerializationDevice::new();
        let ci = ShaderCreateInfo {
            shader_type: ShaderStages::VERTEX | ShaderStages::PIXEL,
            entry_point: "main",
            source_language: ShaderSourceLanguage::Hlsl,
            bytecode: b"code",
        };
        assert!(device.create_shader(&ci, DeviceFlags::all()).is_err());
    }

    #[cfg(feature = "vulkan")]
    #[test]
    fn signature_creation_computes_requested_backends_only() {
        let device = SerializationDevice::new();
        let signature = device
            .create_resource_signature(&sample_signature_desc(), DeviceFlags::VULKAN)
            .unwrap();
        assert!(signature.backend_data().vulkan.is_some());
        #[cfg(feature = "d3d12")]
        assert!(signature.backend_data().d3d12.is_none());
    }

    #[cfg(feature = "vulkan")]
    #[test]
    fn binding_preview_is_deterministic() {
        let device_flags = DeviceFlags::VULKAN;
        let mut device = SerializationDevice::new();
        let signature = device
            .create_resource_signature(&sample_signature_desc(), device_flags)
            .unwrap();

        let attribs = PipelineResourceBindingAttribs {
            signatures: &[&signature],
            backend: Backend::Vulkan,
            shader_stages: ShaderStages::empty(),
            num_render_targets: 0,
        };
        let first: Vec<_> = device
            .get_pipeline_resource_bindings(&attribs)
            .unwrap()
            .to_vec();
        let second: Vec<_> = device
            .get_pipeline_resource_bindings(&attribs)
            .unwrap()
            .to_vec();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "g_Albedo");
    }
}
