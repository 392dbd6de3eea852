//! Metal binding rules.
//!
//! Metal binds per function stage (vertex, pixel/fragment, compute, tile)
//! in three slot ranges: buffers, textures and samplers. Assignment and
//! accumulation work like D3D11 without the render-target offset. The
//! routine is parameterised by the platform's maximum `[[buffer(n)]]`
//! argument count; a pipeline whose accumulated buffer slots exceed it is
//! rejected.

use crate::error::{ArchiveError, Result};
use crate::serializer::SerializerOps;
use crate::types::{ResourceSignatureDesc, ShaderResourceType, ShaderStages};

use super::{PipelineResourceBinding, SignatureView};

/// Stages Metal can bind: vertex, pixel, compute, tile.
pub const STAGE_COUNT: usize = 4;

/// Slot ranges.
pub const RANGE_COUNT: usize = 3;

/// Slot value marking a stage the resource is not visible in.
pub const INVALID_SLOT: u32 = u32::MAX;

/// Metal slot range of a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SlotRange {
    /// `[[buffer(n)]]` arguments.
    Buffer = 0,
    /// `[[texture(n)]]` arguments.
    Texture = 1,
    /// `[[sampler(n)]]` arguments.
    Sampler = 2,
}

/// Maps a resource type to its slot range.
pub fn slot_range(ty: ShaderResourceType) -> SlotRange {
    match ty {
        ShaderResourceType::ConstantBuffer
        | ShaderResourceType::BufferSrv
        | ShaderResourceType::BufferUav
        | ShaderResourceType::AccelStruct => SlotRange::Buffer,
        ShaderResourceType::TextureSrv
        | ShaderResourceType::TextureUav
        | ShaderResourceType::InputAttachment => SlotRange::Texture,
        ShaderResourceType::Sampler => SlotRange::Sampler,
    }
}

/// Per-stage slot index of a single stage bit; `None` for stages Metal
/// does not have.
pub fn stage_index(stage: ShaderStages) -> Option<usize> {
    if stage == ShaderStages::VERTEX {
        Some(0)
    } else if stage == ShaderStages::PIXEL {
        Some(1)
    } else if stage == ShaderStages::COMPUTE {
        Some(2)
    } else if stage == ShaderStages::TILE {
        Some(3)
    } else {
        None
    }
}

/// Slots of one resource, one per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAttribs {
    /// Slot within the resource's range, per stage; [`INVALID_SLOT`]
    /// where the stage is inactive.
    pub slots: [u32; STAGE_COUNT],
}

impl Default for ResourceAttribs {
    fn default() -> Self {
        Self {
            slots: [INVALID_SLOT; STAGE_COUNT],
        }
    }
}

/// Metal attributes of a whole signature, shared by the iOS and macOS
/// archive blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetalSignatureData {
    /// Per-resource slots, parallel to the declared resources.
    pub resources: Vec<ResourceAttribs>,
    /// Slots consumed per range per stage.
    pub range_counts: [[u32; STAGE_COUNT]; RANGE_COUNT],
}

impl MetalSignatureData {
    /// Advances the running base slots past this signature.
    pub fn shift_bindings(&self, base: &mut [[u32; STAGE_COUNT]; RANGE_COUNT]) {
        for (range, counts) in base.iter_mut().zip(self.range_counts.iter()) {
            for (slot, count) in range.iter_mut().zip(counts.iter()) {
                *slot += *count;
            }
        }
    }
}

/// Assigns Metal slots to every resource of a signature.
pub fn assign(desc: &ResourceSignatureDesc<'_>) -> Result<MetalSignatureData> {
    let mut counters = [[0u32; STAGE_COUNT]; RANGE_COUNT];
    let mut data = MetalSignatureData::default();

    for res in &desc.resources {
        let range = slot_range(res.resource_type) as usize;
        let mut attribs = ResourceAttribs::default();
        let mut stages = res.shader_stages;
        while !stages.is_empty() {
            let stage = stages.extract_lsb();
            let Some(slot) = stage_index(stage) else {
                continue;
            };
            attribs.slots[slot] = counters[range][slot];
            counters[range][slot] += res.array_size.max(1);
        }
        data.resources.push(attribs);
    }

    data.range_counts = counters;
    Ok(data)
}

/// Wire codec for [`MetalSignatureData`].
pub(crate) fn data_codec<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    data: &mut MetalSignatureData,
) -> Result<()> {
    let mut count = data.resources.len() as u32;
    ser.u32(&mut count)?;
    if ser.is_reading() {
        data.resources.clear();
        data.resources
            .resize_with(count as usize, ResourceAttribs::default);
    }
    for attr in data.resources.iter_mut() {
        for slot in attr.slots.iter_mut() {
            ser.u32(slot)?;
        }
    }
    for range in data.range_counts.iter_mut() {
        for count in range.iter_mut() {
            ser.u32(count)?;
        }
    }
    Ok(())
}

/// Emits bindings for an ordered signature set. `max_buffer_arguments`
/// bounds the accumulated buffer slots.
pub(crate) fn emit(
    sorted: &[SignatureView<'_>],
    shader_stages: ShaderStages,
    max_buffer_arguments: u32,
    out: &mut Vec<PipelineResourceBinding>,
) -> Result<()> {
    let supported =
        ShaderStages::VERTEX | ShaderStages::PIXEL | ShaderStages::COMPUTE | ShaderStages::TILE;

    let mut base = [[0u32; STAGE_COUNT]; RANGE_COUNT];
    for view in sorted {
        let Some(data) = view.data.metal.as_ref() else {
            continue;
        };

        for (res, attr) in view.resources.iter().zip(data.resources.iter()) {
            let range = slot_range(res.resource_type);
            let mut stages = shader_stages & supported;
            while !stages.is_empty() {
                let stage = stages.extract_lsb();
                if !res.shader_stages.contains(stage) {
                    continue;
                }
                let Some(slot) = stage_index(stage) else {
                    continue;
                };
                let register = base[range as usize][slot] + attr.slots[slot];
                if range == SlotRange::Buffer && register >= max_buffer_arguments {
                    return Err(ArchiveError::InvalidSignatureLayout(format!(
                        "buffer '{}' needs slot {register}, above the limit of \
                         {max_buffer_arguments} buffer arguments",
                        res.name
                    )));
                }
                out.push(PipelineResourceBinding {
                    name: res.name.clone(),
                    resource_type: res.resource_type,
                    register,
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
    fn buffers_textures_and_samplers_count_separately() {
        let desc = ResourceSignatureDesc {
            resources: vec![
                resource("cb", ShaderResourceType::ConstantBuffer, ShaderStages::VERTEX, 1),
                resource("vb", ShaderResourceType::BufferSrv, ShaderStages::VERTEX, 1),
                resource("tex", ShaderResourceType::TextureSrv, ShaderStages::PIXEL, 1),
                resource("smp", ShaderResourceType::Sampler, ShaderStages::PIXEL, 1),
            ],
            ..ResourceSignatureDesc::default()
        };
        let data = assign(&desc).unwrap();
        assert_eq!(data.resources[0].slots[0], 0);
        assert_eq!(data.resources[1].slots[0], 1);
        assert_eq!(data.resources[2].slots[1], 0);
        assert_eq!(data.resources[3].slots[1], 0);
        assert_eq!(data.range_counts[SlotRange::Buffer as usize][0], 2);
    }

    #[test]
    fn exceeding_the_buffer_argument_limit_is_rejected() {
        let desc = ResourceSignatureDesc {
            resources: vec![resource(
                "big",
                ShaderResourceType::ConstantBuffer,
                ShaderStages::VERTEX,
                40,
            ), resource(
                "one_more",
                ShaderResourceType::ConstantBuffer,
                ShaderStages::VERTEX,
                1,
            )],
            ..ResourceSignatureDesc::default()
        };
        let resources: Vec<SignatureResource> = desc.resources.iter().map(owned).collect();
        let backend_data = BackendSignatureData {
            metal: Some(assign(&desc).unwrap()),
            ..BackendSignatureData::default()
        };
        let views = [SignatureView {
            binding_index: 0,
            resources: &resources,
            immutable_samplers: &[],
            data: &backend_data,
        }];

        let mut out = Vec::new();
        let result = emit(&views, ShaderStages::all(), 31, &mut out);
        assert!(matches!(
            result,
            Err(ArchiveError::InvalidSignatureLayout(_))
        ));
    }
}
