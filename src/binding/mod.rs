//! Per-backend binding assignment.
//!
//! Two jobs live here, both pure functions of their inputs:
//!
//! 1. **Attribute assignment.** When a signature is created for
//!    serialization, each backend walks the declared resources and assigns
//!    its native attributes: D3D11 per-stage bind points, D3D12
//!    register/space pairs, GL cache offsets, Vulkan descriptor set and
//!    binding indices, Metal per-stage slots. The result is stored in the
//!    archive's backend block for that signature.
//! 2. **Binding emission.** Given an ordered signature set, produce the
//!    flat list of [`PipelineResourceBinding`]s a pipeline built from those
//!    signatures will use, accumulating inter-signature offsets according
//!    to each backend's rules.
//!
//! Emission order is fixed: within a signature, all resources in declared
//! order, then all immutable samplers; across signatures, ascending binding
//! index. Backends compiled out by their cargo feature emit an empty list.

use crate::error::{ArchiveError, Result};
use crate::format::{Backend, MAX_RESOURCE_SIGNATURES};
use crate::types::{
    PipelineResourceFlags, ResourceVariableType, ShaderResourceType, ShaderStages,
};

#[cfg(feature = "d3d11")]
pub mod d3d11;
#[cfg(feature = "d3d12")]
pub mod d3d12;
#[cfg(feature = "opengl")]
pub mod gl;
#[cfg(feature = "metal")]
pub mod metal;
#[cfg(feature = "vulkan")]
pub mod vulkan;

/// Maximum number of `[[buffer(n)]]` arguments a Metal function can take.
#[cfg(feature = "metal")]
pub const METAL_MAX_BUFFER_ARGUMENTS: u32 = 31;

/// One concrete binding a pipeline will use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResourceBinding {
    /// Resource name as declared by its signature.
    pub name: String,
    /// Slot kind.
    pub resource_type: ShaderResourceType,
    /// Backend register / binding number.
    pub register: u32,
    /// Backend register space / descriptor set.
    pub space: u16,
    /// Array size; 0 for runtime arrays.
    pub array_size: u32,
    /// Stages the binding applies to. Stage-split backends (D3D11, GL,
    /// Metal) report a single stage per binding; D3D12 and Vulkan report
    /// the resource's full mask.
    pub shader_stages: ShaderStages,
}

/// Owned copy of one declared resource, kept by serialized signatures so
/// emission does not re-decode descriptor tails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureResource {
    /// Resource name.
    pub name: String,
    /// Visible stages.
    pub shader_stages: ShaderStages,
    /// Array size; 1 for non-arrays.
    pub array_size: u32,
    /// Slot kind.
    pub resource_type: ShaderResourceType,
    /// Binding frequency.
    pub var_type: ResourceVariableType,
    /// Modifier flags.
    pub flags: PipelineResourceFlags,
}

impl SignatureResource {
    /// Array size as emitted: runtime arrays report 0.
    pub fn emitted_array_size(&self) -> u32 {
        if self.flags.contains(PipelineResourceFlags::RUNTIME_ARRAY) {
            0
        } else {
            self.array_size
        }
    }
}

/// Owned copy of one immutable sampler declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSampler {
    /// Sampler (or assigned texture) name.
    pub name: String,
    /// Visible stages.
    pub shader_stages: ShaderStages,
    /// Array size; 1 for non-arrays.
    pub array_size: u32,
}

/// Per-backend attributes of one signature. Slots for backends that were
/// not requested at creation (or are compiled out) stay `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendSignatureData {
    /// Direct3D11 per-stage bind points.
    #[cfg(feature = "d3d11")]
    pub d3d11: Option<d3d11::D3D11SignatureData>,
    /// Direct3D12 register/space pairs.
    #[cfg(feature = "d3d12")]
    pub d3d12: Option<d3d12::D3D12SignatureData>,
    /// OpenGL cache offsets.
    #[cfg(feature = "opengl")]
    pub gl: Option<gl::GlSignatureData>,
    /// Vulkan descriptor-set layout slots.
    #[cfg(feature = "vulkan")]
    pub vulkan: Option<vulkan::VulkanSignatureData>,
    /// Metal per-stage slots, shared by the iOS and macOS blocks.
    #[cfg(feature = "metal")]
    pub metal: Option<metal::MetalSignatureData>,
}

/// Borrowed view of everything emission needs from one signature.
#[derive(Debug, Clone, Copy)]
pub struct SignatureView<'a> {
    /// Position within the pipeline's signature set.
    pub binding_index: u8,
    /// Declared resources.
    pub resources: &'a [SignatureResource],
    /// Immutable samplers.
    pub immutable_samplers: &'a [SignatureSampler],
    /// Backend attributes.
    pub data: &'a BackendSignatureData,
}

/// Orders signatures by binding index and validates the set: indices must
/// densely fill `[0, N)` with no duplicates and stay below the signature
/// limit.
pub(crate) fn sort_signatures<'a>(
    signatures: &[SignatureView<'a>],
) -> Result<Vec<SignatureView<'a>>> {
    let mut slots: [Option<SignatureView<'a>>; MAX_RESOURCE_SIGNATURES as usize] =
        Default::default();
    let mut count = 0usize;

    for view in signatures {
        let index = usize::from(view.binding_index);
        if index >= slots.len() {
            return Err(ArchiveError::InvalidSignatureLayout(format!(
                "binding index {index} exceeds the limit of {MAX_RESOURCE_SIGNATURES} signatures"
            )));
        }
        if slots[index].is_some() {
            return Err(ArchiveError::InvalidSignatureLayout(format!(
                "duplicate binding index {index}"
            )));
        }
        slots[index] = Some(*view);
        count = count.max(index + 1);
    }

    let mut sorted = Vec::with_capacity(count);
    for (index, slot) in slots.into_iter().take(count).enumerate() {
        match slot {
            Some(view) => sorted.push(view),
            None => {
                return Err(ArchiveError::InvalidSignatureLayout(format!(
                    "binding indices do not densely fill [0, {count}): index {index} is missing"
                )))
            }
        }
    }
    Ok(sorted)
}

/// Computes the bindings a pipeline built from `signatures` will use on
/// `backend`.
///
/// `shader_stages` restricts emission; an empty mask means all stages.
/// `num_render_targets` only matters on D3D11, where pixel-stage UAVs share
/// register space with render targets. Backends compiled out by their cargo
/// feature produce an empty list rather than an error.
pub(crate) fn emit_bindings(
    signatures: &[SignatureView<'_>],
    backend: Backend,
    shader_stages: ShaderStages,
    num_render_targets: u32,
    out: &mut Vec<PipelineResourceBinding>,
) -> Result<()> {
    let sorted = sort_signatures(signatures)?;
    let stages = if shader_stages.is_empty() {
        ShaderStages::all()
    } else {
        shader_stages
    };

    match backend {
        #[cfg(feature = "d3d11")]
        Backend::Direct3D11 => d3d11::emit(&sorted, stages, num_render_targets, out),
        #[cfg(feature = "d3d12")]
        Backend::Direct3D12 => d3d12::emit(&sorted, stages, out),
        #[cfg(feature = "opengl")]
        Backend::OpenGL => gl::emit(&sorted, stages, out),
        #[cfg(feature = "vulkan")]
        Backend::Vulkan => vulkan::emit(&sorted, stages, out),
        #[cfg(feature = "metal")]
        Backend::MetalIos | Backend::MetalMacos => {
            metal::emit(&sorted, stages, METAL_MAX_BUFFER_ARGUMENTS, out)
        }
        #[allow(unreachable_patterns)]
        _ => {
            let _ = num_render_targets;
            Ok(())
        }
    }
}

/// Decoded per-backend attributes of one signature, as read from the
/// reader's backend block.
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureBackendAttribs {
    /// Direct3D11 per-stage bind points.
    #[cfg(feature = "d3d11")]
    D3D11(d3d11::D3D11SignatureData),
    /// Direct3D12 register/space pairs.
    #[cfg(feature = "d3d12")]
    D3D12(d3d12::D3D12SignatureData),
    /// OpenGL cache offsets.
    #[cfg(feature = "opengl")]
    Gl(gl::GlSignatureData),
    /// Vulkan descriptor-set layout slots.
    #[cfg(feature = "vulkan")]
    Vulkan(vulkan::VulkanSignatureData),
    /// Metal per-stage slots.
    #[cfg(feature = "metal")]
    Metal(metal::MetalSignatureData),
}

/// Decodes the backend block bytes of one signature entry. Backends that
/// are compiled out cannot interpret their data and report it missing.
pub(crate) fn decode_attribs(backend: Backend, bytes: &[u8]) -> Result<SignatureBackendAttribs> {
    let mut ser = crate::serializer::ReadSerializer::new(bytes);
    let attribs = match backend {
        #[cfg(feature = "d3d11")]
        Backend::Direct3D11 => {
            let mut data = d3d11::D3D11SignatureData::default();
            d3d11::data_codec(&mut ser, &mut data)?;
            SignatureBackendAttribs::D3D11(data)
        }
        #[cfg(feature = "d3d12")]
        Backend::Direct3D12 => {
            let mut data = d3d12::D3D12SignatureData::default();
            d3d12::data_codec(&mut ser, &mut data)?;
            SignatureBackendAttribs::D3D12(data)
        }
        #[cfg(feature = "opengl")]
        Backend::OpenGL => {
            let mut data = gl::GlSignatureData::default();
            gl::data_codec(&mut ser, &mut data)?;
            SignatureBackendAttribs::Gl(data)
        }
        #[cfg(feature = "vulkan")]
        Backend::Vulkan => {
            let mut data = vulkan::VulkanSignatureData::default();
            vulkan::data_codec(&mut ser, &mut data)?;
            SignatureBackendAttribs::Vulkan(data)
        }
        #[cfg(feature = "metal")]
        Backend::MetalIos | Backend::MetalMacos => {
            let mut data = metal::MetalSignatureData::default();
            metal::data_codec(&mut ser, &mut data)?;
            SignatureBackendAttribs::Metal(data)
        }
        #[allow(unreachable_patterns)]
        _ => return Err(ArchiveError::MissingBackendData(backend)),
    };
    if !ser.is_end() {
        return Err(ArchiveError::DecodeUnderflow(
            "trailing bytes after signature attributes".into(),
        ));
    }
    Ok(attribs)
}

/// Encodes one backend's attribute slot for the archive's backend block.
/// `None` when the signature carries no data for that backend.
pub(crate) fn encode_attribs(
    data: &BackendSignatureData,
    backend: Backend,
) -> Result<Option<Vec<u8>>> {
    use crate::serializer::WriteSerializer;

    macro_rules! encode_slot {
        ($slot:expr, $codec:path) => {
            match $slot.as_ref() {
                Some(slot) => {
                    let mut copy = slot.clone();
                    let mut writer = WriteSerializer::new();
                    $codec(&mut writer, &mut copy)?;
                    Ok(Some(writer.into_vec()))
                }
                None => Ok(None),
            }
        };
    }

    match backend {
        #[cfg(feature = "d3d11")]
        Backend::Direct3D11 => encode_slot!(data.d3d11, d3d11::data_codec),
        #[cfg(feature = "d3d12")]
        Backend::Direct3D12 => encode_slot!(data.d3d12, d3d12::data_codec),
        #[cfg(feature = "opengl")]
        Backend::OpenGL => encode_slot!(data.gl, gl::data_codec),
        #[cfg(feature = "vulkan")]
        Backend::Vulkan => encode_slot!(data.vulkan, vulkan::data_codec),
        #[cfg(feature = "metal")]
        Backend::MetalIos | Backend::MetalMacos => encode_slot!(data.metal, metal::data_codec),
        #[allow(unreachable_patterns)]
        _ => Ok(None),
    }
}
