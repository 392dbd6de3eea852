//! Direct3D11 binding rules.
//!
//! D3D11 binds resources per stage, in four register ranges (constant
//! buffers, shader resources, samplers, unordered access). Every resource
//! gets one bind point per stage it is visible in; pixel-stage UAVs share
//! register space with render targets, so emission starts the pixel UAV
//! base at the pipeline's render target count.

use crate::error::{ArchiveError, Result};
use crate::serializer::SerializerOps;
use crate::types::{ResourceSignatureDesc, ShaderResourceType, ShaderStages};

use super::{PipelineResourceBinding, SignatureView};

/// Stages D3D11 can bind: vertex, pixel, geometry, hull, domain, compute.
pub const STAGE_COUNT: usize = 6;

/// Index of the pixel stage in per-stage arrays.
pub const PIXEL_STAGE_INDEX: usize = 1;

/// Register ranges.
pub const RANGE_COUNT: usize = 4;

/// Bind point value marking a stage the resource is not visible in.
pub const INVALID_BIND_POINT: u8 = u8::MAX;

/// D3D11 register range of a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ResourceRange {
    /// `b` registers.
    ConstantBuffer = 0,
    /// `t` registers.
    ShaderResource = 1,
    /// `s` registers.
    Sampler = 2,
    /// `u` registers.
    UnorderedAccess = 3,
}

/// Maps a resource type to its register range.
pub fn resource_range(ty: ShaderResourceType) -> ResourceRange {
    match ty {
        ShaderResourceType::ConstantBuffer => ResourceRange::ConstantBuffer,
        ShaderResourceType::TextureSrv
        | ShaderResourceType::BufferSrv
        | ShaderResourceType::InputAttachment
        | ShaderResourceType::AccelStruct => ResourceRange::ShaderResource,
        ShaderResourceType::Sampler => ResourceRange::Sampler,
        ShaderResourceType::TextureUav | ShaderResourceType::BufferUav => {
            ResourceRange::UnorderedAccess
        }
    }
}

/// Per-stage slot index of a single stage bit; `None` for stages D3D11
/// does not have (mesh, amplification, tile, ray tracing).
pub fn stage_index(stage: ShaderStages) -> Option<usize> {
    if stage == ShaderStages::VERTEX {
        Some(0)
    } else if stage == ShaderStages::PIXEL {
        Some(1)
    } else if stage == ShaderStages::GEOMETRY {
        Some(2)
    } else if stage == ShaderStages::HULL {
        Some(3)
    } else if stage == ShaderStages::DOMAIN {
        Some(4)
    } else if stage == ShaderStages::COMPUTE {
        Some(5)
    } else {
        None
    }
}

/// Bind points of one resource, one per stage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAttribs {
    /// Register within the resource's range, per stage;
    /// [`INVALID_BIND_POINT`] where the stage is inactive.
    pub bind_points: [u8; STAGE_COUNT],
}

impl Default for ResourceAttribs {
    fn default() -> Self {
        Self {
            bind_points: [INVALID_BIND_POINT; STAGE_COUNT],
        }
    }
}

impl ResourceAttribs {
    /// True when the resource has a bind point in the given stage slot.
    pub fn is_stage_active(&self, stage: usize) -> bool {
        self.bind_points[stage] != INVALID_BIND_POINT
    }
}

/// D3D11 attributes of a whole signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct D3D11SignatureData {
    /// Per-resource bind points, parallel to the declared resources.
    pub resources: Vec<ResourceAttribs>,
    /// Per-sampler bind points, parallel to the immutable samplers.
    pub immutable_samplers: Vec<ResourceAttribs>,
    /// Registers consumed per range per stage; the amount
    /// [`shift_bindings`](Self::shift_bindings) advances by.
    pub range_counts: [[u8; STAGE_COUNT]; RANGE_COUNT],
}

impl D3D11SignatureData {
    /// Advances the running base registers past this signature.
    pub fn shift_bindings(&self, base: &mut [[u32; STAGE_COUNT]; RANGE_COUNT]) {
        for (range, counts) in base.iter_mut().zip(self.range_counts.iter()) {
            for (slot, count) in range.iter_mut().zip(counts.iter()) {
                *slot += u32::from(*count);
            }
        }
    }
}

fn assign_slots(
    counters: &mut [[u32; STAGE_COUNT]; RANGE_COUNT],
    range: ResourceRange,
    shader_stages: ShaderStages,
    array_size: u32,
    name: &str,
) -> Result<ResourceAttribs> {
    let mut attribs = ResourceAttribs::default();
    let mut stages = shader_stages;
    while !stages.is_empty() {
        let stage = stages.extract_lsb();
        let Some(slot) = stage_index(stage) else {
            continue;
        };
        let register = counters[range as usize][slot];
        let bind_point = u8::try_from(register).map_err(|_| {
            ArchiveError::InvalidSignatureLayout(format!(
                "resource '{name}' exceeds the D3D11 register budget"
            ))
        })?;
        attribs.bind_points[slot] = bind_point;
        counters[range as usize][slot] += array_size.max(1);
    }
    Ok(attribs)
}

/// Assigns D3D11 bind points to every resource and immutable sampler of a
/// signature. Pure function of the descriptor.
pub fn assign(desc: &ResourceSignatureDesc<'_>) -> Result<D3D11SignatureData> {
    let mut counters = [[0u32; STAGE_COUNT]; RANGE_COUNT];
    let mut data = D3D11SignatureData::default();

    for res in &desc.resources {
        let range = resource_range(res.resource_type);
        data.resources.push(assign_slots(
            &mut counters,
            range,
            res.shader_stages,
            res.array_size,
            res.name,
        )?);
    }
    for sampler in &desc.immutable_samplers {
        data.immutable_samplers.push(assign_slots(
            &mut counters,
            ResourceRange::Sampler,
            sampler.shader_stages,
            sampler.array_size,
            sampler.sampler_or_texture_name,
        )?);
    }

    for (range, counts) in data.range_counts.iter_mut().zip(counters.iter()) {
        for (dst, src) in range.iter_mut().zip(counts.iter()) {
            *dst = u8::try_from(*src).map_err(|_| {
                ArchiveError::InvalidSignatureLayout(
                    "signature exceeds the D3D11 register budget".into(),
                )
            })?;
        }
    }
    Ok(data)
}

/// Wire codec for [`D3D11SignatureData`].
pub(crate) fn data_codec<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    data: &mut D3D11SignatureData,
) -> Result<()> {
    attribs_seq(ser, &mut data.resources)?;
    attribs_seq(ser, &mut data.immutable_samplers)?;
    for range in data.range_counts.iter_mut() {
        for count in range.iter_mut() {
            ser.u8(count)?;
        }
    }
    Ok(())
}

fn attribs_seq<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    attribs: &mut Vec<ResourceAttribs>,
) -> Result<()> {
    let mut count = attribs.len() as u32;
    ser.u32(&mut count)?;
    if ser.is_reading() {
        attribs.clear();
        attribs.resize_with(count as usize, ResourceAttribs::default);
    }
    for attr in attribs.iter_mut() {
        for point in attr.bind_points.iter_mut() {
            ser.u8(point)?;
        }
    }
    Ok(())
}

/// Emits bindings for an ordered signature set.
pub(crate) fn emit(
    sorted: &[SignatureView<'_>],
    shader_stages: ShaderStages,
    num_render_targets: u32,
    out: &mut Vec<PipelineResourceBinding>,
) -> Result<()> {
    let supported = ShaderStages::ALL_GRAPHICS | ShaderStages::COMPUTE;

    let mut base = [[0u32; STAGE_COUNT]; RANGE_COUNT];
    // UAVs share register space with render targets in the pixel stage.
    base[ResourceRange::UnorderedAccess as usize][PIXEL_STAGE_INDEX] = num_render_targets;

    for view in sorted {
        let Some(data) = view.data.d3d11.as_ref() else {
            continue;
        };

        for (res, attr) in view.resources.iter().zip(data.resources.iter()) {
            let range = resource_range(res.resource_type) as usize;
            let mut stages = shader_stages & supported;
            while !stages.is_empty() {
                let stage = stages.extract_lsb();
                if !res.shader_stages.contains(stage) {
                    continue;
                }
                let Some(slot) = stage_index(stage) else {
                    continue;
                };
                debug_assert!(attr.is_stage_active(slot));
                out.push(PipelineResourceBinding {
                    name: res.name.clone(),
                    resource_type: res.resource_type,
                    register: base[range][slot] + u32::from(attr.bind_points[slot]),
                    space: 0,
                    array_size: res.emitted_array_size(),
                    shader_stages: stage,
                });
            }
        }

        for (sampler, attr) in view
            .immutable_samplers
            .iter()
            .zip(data.immutable_samplers.iter())
        {
            let range = ResourceRange::Sampler as usize;
            let mut stages = shader_stages & supported;
            while !stages.is_empty() {
                let stage = stages.extract_lsb();
                if !sampler.shader_stages.contains(stage) {
                    continue;
                }
                let Some(slot) = stage_index(stage) else {
                    continue;
                };
                debug_assert!(attr.is_stage_active(slot));
                out.push(PipelineResourceBinding {
                    name: sampler.name.clone(),
                    resource_type: ShaderResourceType::Sampler,
                    register: base[range][slot] + u32::from(attr.bind_points[slot]),
                    space: 0,
                    array_size: sampler.array_size,
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
    fn bind_points_are_per_stage_and_per_range() {
        let desc = ResourceSignatureDesc {
            resources: vec![
                resource("cb0", ShaderResourceType::ConstantBuffer, ShaderStages::VERTEX | ShaderStages::PIXEL, 1),
                resource("cb1", ShaderResourceType::ConstantBuffer, ShaderStages::PIXEL, 1),
                resource("tex", ShaderResourceType::TextureSrv, ShaderStages::PIXEL, 1),
            ],
            ..ResourceSignatureDesc::default()
        };
        let data = assign(&desc).unwrap();

        // cb0 takes b0 in both stages.
        assert_eq!(data.resources[0].bind_points[0], 0);
        assert_eq!(data.resources[0].bind_points[1], 0);
        // cb1 is pixel-only and lands after cb0 there; vertex stays free.
        assert_eq!(data.resources[1].bind_points[1], 1);
        assert!(!data.resources[1].is_stage_active(0));
        // The texture starts a fresh range at t0.
        assert_eq!(data.resources[2].bind_points[1], 0);

        assert_eq!(data.range_counts[ResourceRange::ConstantBuffer as usize][1], 2);
        assert_eq!(data.range_counts[ResourceRange::ShaderResource as usize][1], 1);
    }

    #[test]
    fn pixel_stage_uavs_start_after_render_targets() {
        // One UAV in the pixel stage with three bound render targets must
        // land at u3.
        let desc = ResourceSignatureDesc {
            resources: vec![resource(
                "g_Output",
                ShaderResourceType::TextureUav,
                ShaderStages::PIXEL,
                1,
            )],
            ..ResourceSignatureDesc::default()
        };
        let data = assign(&desc).unwrap();
        let resources: Vec<SignatureResource> = desc.resources.iter().map(owned).collect();
        let backend_data = BackendSignatureData {
            d3d11: Some(data),
            ..BackendSignatureData::default()
        };

        let views = [SignatureView {
            binding_index: 0,
            resources: &resources,
            immutable_samplers: &[],
            data: &backend_data,
        }];
        let mut out = Vec::new();
        emit(&views, ShaderStages::all(), 3, &mut out).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].register, 3);
        assert_eq!(out[0].space, 0);
        assert_eq!(out[0].shader_stages, ShaderStages::PIXEL);
    }

    #[test]
    fn later_signatures_are_shifted_by_earlier_range_counts() {
        let first = ResourceSignatureDesc {
            resources: vec![
                resource("a", ShaderResourceType::ConstantBuffer, ShaderStages::PIXEL, 2),
                resource("b", ShaderResourceType::TextureSrv, ShaderStages::PIXEL, 1),
            ],
            ..ResourceSignatureDesc::default()
        };
        let second = ResourceSignatureDesc {
            binding_index: 1,
            resources: vec![resource(
                "c",
                ShaderResourceType::ConstantBuffer,
                ShaderStages::PIXEL,
                1,
            )],
            ..ResourceSignatureDesc::default()
        };

        let first_res: Vec<SignatureResource> = first.resources.iter().map(owned).collect();
        let second_res: Vec<SignatureResource> = second.resources.iter().map(owned).collect();
        let first_data = BackendSignatureData {
            d3d11: Some(assign(&first).unwrap()),
            ..BackendSignatureData::default()
        };
        let second_data = BackendSignatureData {
            d3d11: Some(assign(&second).unwrap()),
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
        emit(&views, ShaderStages::PIXEL, 0, &mut out).unwrap();

        // "a" occupies b0-b1, so "c" from the second signature lands at b2.
        let c = out.iter().find(|b| b.name == "c").unwrap();
        assert_eq!(c.register, 2);
    }

    #[test]
    fn immutable_samplers_emit_as_sampler_bindings() {
        let desc = ResourceSignatureDesc {
            resources: vec![resource(
                "g_Tex",
                ShaderResourceType::TextureSrv,
                ShaderStages::PIXEL,
                1,
            )],
            immutable_samplers: vec![crate::types::ImmutableSamplerDesc {
                shader_stages: ShaderStages::PIXEL,
                sampler_or_texture_name: "g_Tex_sampler",
                array_size: 1,
                desc: crate::types::SamplerDesc::default(),
            }],
            ..ResourceSignatureDesc::default()
        };
        let resources: Vec<SignatureResource> = desc.resources.iter().map(owned).collect();
        let samplers = vec![crate::binding::SignatureSampler {
            name: "g_Tex_sampler".to_owned(),
            shader_stages: ShaderStages::PIXEL,
            array_size: 1,
        }];
        let backend_data = BackendSignatureData {
            d3d11: Some(assign(&desc).unwrap()),
            ..BackendSignatureData::default()
        };

        let views = [SignatureView {
            binding_index: 0,
            resources: &resources,
            immutable_samplers: &samplers,
            data: &backend_data,
        }];
        let mut out = Vec::new();
        emit(&views, ShaderStages::all(), 0, &mut out).unwrap();

        // The texture first, then the sampler: declared resources before
        // immutable samplers.
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "g_Tex");
        assert_eq!(out[1].name, "g_Tex_sampler");
        assert_eq!(out[1].resource_type, ShaderResourceType::Sampler);
        assert_eq!(out[1].register, 0);
    }
}
