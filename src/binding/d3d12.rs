//! Direct3D12 binding rules.
//!
//! D3D12 keeps a resource's shader register fixed and separates signatures
//! by register space instead: the root signature gives each signature a
//! base register space equal to the prefix sum of the space counts of the
//! signatures before it. Within a signature, ordinary resources share
//! space 0 with one running register counter per register class; runtime
//! arrays are unbounded and get a dedicated space of their own so they can
//! trail the root signature.

use crate::error::Result;
use crate::serializer::SerializerOps;
use crate::types::{PipelineResourceFlags, ResourceSignatureDesc, ShaderResourceType};
use crate::types::ShaderStages;

use super::{PipelineResourceBinding, SignatureView};

/// Register classes: `b`, `t`, `s`, `u`.
pub const CLASS_COUNT: usize = 4;

fn register_class(ty: ShaderResourceType) -> usize {
    match ty {
        ShaderResourceType::ConstantBuffer => 0,
        ShaderResourceType::TextureSrv
        | ShaderResourceType::BufferSrv
        | ShaderResourceType::InputAttachment
        | ShaderResourceType::AccelStruct => 1,
        ShaderResourceType::Sampler => 2,
        ShaderResourceType::TextureUav | ShaderResourceType::BufferUav => 3,
    }
}

/// Register and space of one resource, relative to the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceAttribs {
    /// Shader register.
    pub register: u32,
    /// Register space within the signature; 0 except for runtime arrays.
    pub space: u32,
}

/// D3D12 attributes of a whole signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct D3D12SignatureData {
    /// Per-resource attributes, parallel to the declared resources.
    pub resources: Vec<ResourceAttribs>,
    /// Register spaces this signature occupies in a root signature:
    /// 1 plus one dedicated space per runtime array.
    pub num_spaces: u32,
}

/// Assigns registers and spaces to every resource of a signature.
pub fn assign(desc: &ResourceSignatureDesc<'_>) -> Result<D3D12SignatureData> {
    let mut counters = [0u32; CLASS_COUNT];
    let mut next_runtime_space = 1u32;
    let mut data = D3D12SignatureData::default();

    for res in &desc.resources {
        if res.flags.contains(PipelineResourceFlags::RUNTIME_ARRAY) {
            data.resources.push(ResourceAttribs {
                register: 0,
                space: next_runtime_space,
            });
            next_runtime_space += 1;
        } else {
            let class = register_class(res.resource_type);
            data.resources.push(ResourceAttribs {
                register: counters[class],
                space: 0,
            });
            counters[class] += res.array_size.max(1);
        }
    }

    data.num_spaces = next_runtime_space;
    Ok(data)
}

/// Wire codec for [`D3D12SignatureData`].
pub(crate) fn data_codec<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    data: &mut D3D12SignatureData,
) -> Result<()> {
    let mut count = data.resources.len() as u32;
    ser.u32(&mut count)?;
    if ser.is_reading() {
        data.resources.clear();
        data.resources
            .resize_with(count as usize, ResourceAttribs::default);
    }
    for attr in data.resources.iter_mut() {
        ser.u32(&mut attr.register)?;
        ser.u32(&mut attr.space)?;
    }
    ser.u32(&mut data.num_spaces)
}

/// Emits bindings for an ordered signature set. The base register space of
/// signature `i` is the prefix sum of `num_spaces` over `0..i`.
pub(crate) fn emit(
    sorted: &[SignatureView<'_>],
    shader_stages: ShaderStages,
    out: &mut Vec<PipelineResourceBinding>,
) -> Result<()> {
    let mut base_register_space = 0u32;

    for view in sorted {
        let Some(data) = view.data.d3d12.as_ref() else {
            continue;
        };

        for (res, attr) in view.resources.iter().zip(data.resources.iter()) {
            if (res.shader_stages & shader_stages).is_empty() {
                continue;
            }
            out.push(PipelineResourceBinding {
                name: res.name.clone(),
                resource_type: res.resource_type,
                register: attr.register,
                space: (base_register_space + attr.space) as u16,
                array_size: res.emitted_array_size(),
                // D3D12 reports the resource's own mask, not a per-stage
                // split.
                shader_stages: res.shader_stages,
            });
        }

        base_register_space += data.num_spaces;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BackendSignatureData, SignatureResource};
    use crate::types::{PipelineResourceDesc, ResourceVariableType};

    fn resource(
        name: &'static str,
        ty: ShaderResourceType,
        array_size: u32,
        flags: PipelineResourceFlags,
    ) -> PipelineResourceDesc<'static> {
        PipelineResourceDesc {
            name,
            shader_stages: ShaderStages::PIXEL,
            array_size,
            resource_type: ty,
            var_type: ResourceVariableType::Static,
            flags,
        }
    }

    fn owned(res: &PipelineResourceDesc<'_>) -> SignatureResource {
        SignatureResource {
            name: res.name.to_owned(),
            shader_stages: res.shader_stages,
            array_size: res.array_size,
            resource_type: res.resource_type,
            var_type: res.var_type,
            flags: res.flags,
        }
    }

    fn three_resource_signature() -> ResourceSignatureDesc<'static> {
        ResourceSignatureDesc {
            resources: vec![
                resource("cb", ShaderResourceType::ConstantBuffer, 1, PipelineResourceFlags::empty()),
                resource("tex0", ShaderResourceType::TextureSrv, 1, PipelineResourceFlags::empty()),
                resource("tex1", ShaderResourceType::TextureSrv, 1, PipelineResourceFlags::empty()),
            ],
            ..ResourceSignatureDesc::default()
        }
    }

    #[test]
    fn registers_run_per_class_in_space_zero() {
        let data = assign(&three_resource_signature()).unwrap();
        assert_eq!(data.resources[0], ResourceAttribs { register: 0, space: 0 });
        assert_eq!(data.resources[1], ResourceAttribs { register: 0, space: 0 });
        assert_eq!(data.resources[2], ResourceAttribs { register: 1, space: 0 });
        assert_eq!(data.num_spaces, 1);
    }

    #[test]
    fn runtime_arrays_get_their_own_space() {
        let desc = ResourceSignatureDesc {
            resources: vec![
                resource("tex", ShaderResourceType::TextureSrv, 1, PipelineResourceFlags::empty()),
                resource("bindless", ShaderResourceType::TextureSrv, 0, PipelineResourceFlags::RUNTIME_ARRAY),
            ],
            ..ResourceSignatureDesc::default()
        };
        let data = assign(&desc).unwrap();
        assert_eq!(data.resources[1], ResourceAttribs { register: 0, space: 1 });
        assert_eq!(data.num_spaces, 2);
    }

    #[test]
    fn signature_spaces_accumulate_and_registers_stay_fixed() {
        // Two signatures, three resources each, all in space 0 with fixed
        // registers. The second signature's resources keep their registers
        // and move to the next base space.
        let first = three_resource_signature();
        let second = ResourceSignatureDesc {
            binding_index: 1,
            ..three_resource_signature()
        };

        let first_res: Vec<SignatureResource> = first.resources.iter().map(owned).collect();
        let second_res: Vec<SignatureResource> = second.resources.iter().map(owned).collect();
        let first_data = BackendSignatureData {
            d3d12: Some(assign(&first).unwrap()),
            ..BackendSignatureData::default()
        };
        let second_data = BackendSignatureData {
            d3d12: Some(assign(&second).unwrap()),
            ..BackendSignatureData::default()
        };

        let views = [
            SignatureView {
                binding_index: 0,
                resources: &first_res,
                immutable_samplers: &[],
                data: &first_data,
            },
            SignatureView {
                binding_index: 1,
                resources: &second_res,
                immutable_samplers: &[],
                data: &second_data,
            },
        ];
        let mut out = Vec::new();
        emit(&views, ShaderStages::all(), &mut out).unwrap();

        assert_eq!(out.len(), 6);
        for binding in &out[..3] {
            assert_eq!(binding.space, 0);
        }
        for binding in &out[3..] {
            assert_eq!(binding.space, 1);
        }
        // Registers repeat across signatures; only the space moved.
        assert_eq!(out[1].register, out[4].register);
        assert_eq!(out[2].register, out[5].register);
    }
}
