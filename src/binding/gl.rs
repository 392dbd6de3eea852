//! OpenGL / GLES binding rules.
//!
//! GL has stage-agnostic binding points: one running counter per range
//! (uniform buffers, textures, images, storage buffers) shared by every
//! stage. A resource's cache offset is its slot within its signature;
//! emission adds the accumulated base of the preceding signatures and
//! reports one binding per active stage, because the interface treats each
//! stage separately. Immutable samplers are baked into sampler state and
//! consume no binding points.

use crate::error::Result;
use crate::serializer::SerializerOps;
use crate::types::{ResourceSignatureDesc, ShaderResourceType, ShaderStages};

use super::{PipelineResourceBinding, SignatureView};

/// Binding ranges.
pub const RANGE_COUNT: usize = 4;

/// GL binding range of a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum BindingRange {
    /// Uniform buffer binding points.
    UniformBuffer = 0,
    /// Texture units (samplers and buffer textures included).
    Texture = 1,
    /// Image units.
    Image = 2,
    /// Shader storage buffer binding points.
    StorageBuffer = 3,
}

/// Maps a resource type to its binding range.
pub fn binding_range(ty: ShaderResourceType) -> BindingRange {
    match ty {
        ShaderResourceType::ConstantBuffer => BindingRange::UniformBuffer,
        ShaderResourceType::TextureSrv
        | ShaderResourceType::BufferSrv
        | ShaderResourceType::Sampler
        | ShaderResourceType::InputAttachment
        | ShaderResourceType::AccelStruct => BindingRange::Texture,
        ShaderResourceType::TextureUav => BindingRange::Image,
        ShaderResourceType::BufferUav => BindingRange::StorageBuffer,
    }
}

/// GL attributes of a whole signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlSignatureData {
    /// Per-resource cache offsets within the signature, parallel to the
    /// declared resources.
    pub cache_offsets: Vec<u32>,
    /// Binding points consumed per range; the amount
    /// [`shift_bindings`](Self::shift_bindings) advances by.
    pub range_counts: [u32; RANGE_COUNT],
}

impl GlSignatureData {
    /// Advances the running base bindings past this signature.
    pub fn shift_bindings(&self, base: &mut [u32; RANGE_COUNT]) {
        for (slot, count) in base.iter_mut().zip(self.range_counts.iter()) {
            *slot += *count;
        }
    }
}

/// Assigns stage-agnostic cache offsets to every resource of a signature.
pub fn assign(desc: &ResourceSignatureDesc<'_>) -> Result<GlSignatureData> {
    let mut counters = [0u32; RANGE_COUNT];
    let mut data = GlSignatureData::default();

    for res in &desc.resources {
        let range = binding_range(res.resource_type) as usize;
        data.cache_offsets.push(counters[range]);
        counters[range] += res.array_size.max(1);
    }

    data.range_counts = counters;
    Ok(data)
}

/// Wire codec for [`GlSignatureData`].
pub(crate) fn data_codec<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    data: &mut GlSignatureData,
) -> Result<()> {
    let mut count = data.cache_offsets.len() as u32;
    ser.u32(&mut count)?;
    if ser.is_reading() {
        data.cache_offsets.clear();
        data.cache_offsets.resize(count as usize, 0);
    }
    for offset in data.cache_offsets.iter_mut() {
        ser.u32(offset)?;
    }
    for range in data.range_counts.iter_mut() {
        ser.u32(range)?;
    }
    Ok(())
}

/// Emits bindings for an ordered signature set, one per active stage.
pub(crate) fn emit(
    sorted: &[SignatureView<'_>],
    shader_stages: ShaderStages,
    out: &mut Vec<PipelineResourceBinding>,
) -> Result<()> {
    let supported = ShaderStages::ALL_GRAPHICS | ShaderStages::COMPUTE;

    let mut base = [0u32; RANGE_COUNT];
    for view in sorted {
        let Some(data) = view.data.gl.as_ref() else {
            continue;
        };

        for (res, cache_offset) in view.resources.iter().zip(data.cache_offsets.iter()) {
            let range = binding_range(res.resource_type) as usize;
            let mut stages = shader_stages & supported;
            while !stages.is_empty() {
                let stage = stages.extract_lsb();
                if !res.shader_stages.contains(stage) {
                    continue;
                }
                out.push(PipelineResourceBinding {
                    name: res.name.clone(),
                    resource_type: res.resource_type,
                    register: base[range] + cache_offset,
                    space: 0,
                    array_size: res.emitted_array_size(),
                    shader_stages: stage,
                });
            }
        }

        data.shift_bindings(&mut base);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BackendSignatureData, SignatureResource};
    use crate::types::{
        PipelineResourceDesc, PipelineResourceFlags, ResourceVariableType,
    };

    fn resource(
        name: &'static str,
        ty: ShaderResourceType,
        stages: ShaderStages,
        array_size: u32,
    ) -> PipelineResourceDesc<'static> {
        PipelineResourceDesc {
            name,
            shader_stages: stages,
            array_size,
            resource_type: ty,
            var_type: ResourceVariableType::Static,
            flags: PipelineResourceFlags::empty(),
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

    #[test]
    fn cache_offsets_are_stage_agnostic() {
        let desc = ResourceSignatureDesc {
            resources: vec![
                resource("ub0", ShaderResourceType::ConstantBuffer, ShaderStages::VERTEX, 1),
                resource("ub1", ShaderResourceType::ConstantBuffer, ShaderStages::PIXEL, 1),
                resource("tex", ShaderResourceType::TextureSrv, ShaderStages::PIXEL, 3),
            ],
            ..ResourceSignatureDesc::default()
        };
        let data = assign(&desc).unwrap();
        // Different stages, same counter.
        assert_eq!(data.cache_offsets, vec![0, 1, 0]);
        assert_eq!(data.range_counts[BindingRange::UniformBuffer as usize], 2);
        assert_eq!(data.range_counts[BindingRange::Texture as usize], 3);
    }

    #[test]
    fn emission_splits_per_stage_and_accumulates_bases() {
        let first = ResourceSignatureDesc {
            resources: vec![resource(
                "shared_ub",
                ShaderResourceType::ConstantBuffer,
                ShaderStages::VERTEX | ShaderStages::PIXEL,
                1,
            )],
            ..ResourceSignatureDesc::default()
        };
        let second = ResourceSignatureDesc {
            binding_index: 1,
            resources: vec![resource(
                "material_ub",
                ShaderResourceType::ConstantBuffer,
                ShaderStages::PIXEL,
                1,
            )],
            ..ResourceSignatureDesc::default()
        };

        let first_res: Vec<SignatureResource> = first.resources.iter().map(owned).collect();
        let second_res: Vec<SignatureResource> = second.resources.iter().map(owned).collect();
        let first_data = BackendSignatureData {
            gl: Some(assign(&first).unwrap()),
            ..BackendSignatureData::default()
        };
        let second_data = BackendSignatureData {
            gl: Some(assign(&second).unwrap()),
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

        // shared_ub appears once per active stage at binding 0.
        assert_eq!(out[0].name, "shared_ub");
        assert_eq!(out[0].shader_stages, ShaderStages::VERTEX);
        assert_eq!(out[1].name, "shared_ub");
        assert_eq!(out[1].shader_stages, ShaderStages::PIXEL);
        assert_eq!(out[0].register, 0);
        assert_eq!(out[1].register, 0);

        // material_ub is shifted past the first signature's uniform buffer.
        assert_eq!(out[2].name, "material_ub");
        assert_eq!(out[2].register, 1);
    }
}
