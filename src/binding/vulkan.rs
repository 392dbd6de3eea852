//! Vulkan binding rules.
//!
//! A signature contributes up to two descriptor set layouts: one for
//! static and mutable resources, one for dynamic resources. The sets are
//! compacted, so a signature with only dynamic resources has that set at
//! local index 0. A pipeline lays the contributed sets out back to back:
//! emission keeps a running layout count and reports
//! `space = layout_count + local_set`, advancing the count by the number of
//! sets the signature actually contributed. Binding numbers count
//! resources, not array elements: an array occupies one binding with a
//! descriptor count. Immutable samplers are baked into the set layouts and
//! consume no bindings.

use crate::error::Result;
use crate::serializer::SerializerOps;
use crate::types::{ResourceSignatureDesc, ResourceVariableType, ShaderStages};

use super::{PipelineResourceBinding, SignatureView};

/// Descriptor set holding static and mutable resources.
pub const SET_ID_STATIC_MUTABLE: usize = 0;
/// Descriptor set holding dynamic resources.
pub const SET_ID_DYNAMIC: usize = 1;
/// Sets a signature may contribute.
pub const SET_COUNT: usize = 2;

/// Reported size of an absent descriptor set.
pub const UNUSED_SET: u32 = u32::MAX;

/// Descriptor set and binding of one resource, local to the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceAttribs {
    /// Compacted set index within the signature (0 or 1).
    pub descriptor_set: u32,
    /// Binding number within the set.
    pub binding_index: u32,
}

/// Vulkan attributes of a whole signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulkanSignatureData {
    /// Per-resource attributes, parallel to the declared resources.
    pub resources: Vec<ResourceAttribs>,
    /// Binding count per set id (static-mutable, dynamic);
    /// [`UNUSED_SET`] marks a set the signature does not contribute.
    pub set_sizes: [u32; SET_COUNT],
}

impl Default for VulkanSignatureData {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            set_sizes: [UNUSED_SET; SET_COUNT],
        }
    }
}

impl VulkanSignatureData {
    /// Number of descriptor set layouts this signature contributes.
    pub fn layout_count(&self) -> u32 {
        self.set_sizes
            .iter()
            .filter(|&&size| size != UNUSED_SET)
            .count() as u32
    }
}

fn set_id(var_type: ResourceVariableType) -> usize {
    match var_type {
        ResourceVariableType::Static | ResourceVariableType::Mutable => SET_ID_STATIC_MUTABLE,
        ResourceVariableType::Dynamic => SET_ID_DYNAMIC,
    }
}

/// Assigns descriptor sets and binding numbers to every resource of a
/// signature.
pub fn assign(desc: &ResourceSignatureDesc<'_>) -> Result<VulkanSignatureData> {
    let static_present = desc
        .resources
        .iter()
        .any(|r| set_id(r.var_type) == SET_ID_STATIC_MUTABLE)
        || !desc.immutable_samplers.is_empty();
    let dynamic_present = desc
        .resources
        .iter()
        .any(|r| set_id(r.var_type) == SET_ID_DYNAMIC);

    // Compacted local index of each set.
    let local_index = |set: usize| -> u32 {
        if set == SET_ID_STATIC_MUTABLE {
            0
        } else if static_present {
            1
        } else {
            0
        }
    };

    let mut counters = [0u32; SET_COUNT];
    let mut data = VulkanSignatureData::default();

    for res in &desc.resources {
        let set = set_id(res.var_type);
        data.resources.push(ResourceAttribs {
            descriptor_set: local_index(set),
            binding_index: counters[set],
        });
        // One binding per resource; arrays become the descriptor count.
        counters[set] += 1;
    }

    if static_present {
        data.set_sizes[SET_ID_STATIC_MUTABLE] = counters[SET_ID_STATIC_MUTABLE];
    }
    if dynamic_present {
        data.set_sizes[SET_ID_DYNAMIC] = counters[SET_ID_DYNAMIC];
    }
    Ok(data)
}

/// Wire codec for [`VulkanSignatureData`].
pub(crate) fn data_codec<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    data: &mut VulkanSignatureData,
) -> Result<()> {
    let mut count = data.resources.len() as u32;
    ser.u32(&mut count)?;
    if ser.is_reading() {
        data.resources.clear();
        data.resources
            .resize_with(count as usize, ResourceAttribs::default);
    }
    for attr in data.resources.iter_mut() {
        ser.u32(&mut attr.descriptor_set)?;
        ser.u32(&mut attr.binding_index)?;
    }
    for size in data.set_sizes.iter_mut() {
        ser.u32(size)?;
    }
    Ok(())
}

/// Emits bindings for an ordered signature set with a running descriptor
/// set layout count.
pub(crate) fn emit(
    sorted: &[SignatureView<'_>],
    shader_stages: ShaderStages,
    out: &mut Vec<PipelineResourceBinding>,
) -> Result<()> {
    let mut desc_set_layout_count = 0u32;

    for view in sorted {
        let Some(data) = view.data.vulkan.as_ref() else {
            continue;
        };

        for (res, attr) in view.resources.iter().zip(data.resources.iter()) {
            if (res.shader_stages & shader_stages).is_empty() {
                continue;
            }
            out.push(PipelineResourceBinding {
                name: res.name.clone(),
                resource_type: res.resource_type,
                register: attr.binding_index,
                space: (desc_set_layout_count + attr.descriptor_set) as u16,
                array_size: res.emitted_array_size(),
                // Vulkan reports the resource's own mask.
                shader_stages: res.shader_stages,
            });
        }

        desc_set_layout_count += data.layout_count();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BackendSignatureData, SignatureResource};
    use crate::types::{
        PipelineResourceDesc, PipelineResourceFlags, ShaderResourceType,
    };

    fn resource(
        name: &'static str,
        var_type: ResourceVariableType,
    ) -> PipelineResourceDesc<'static> {
        PipelineResourceDesc {
            name,
            shader_stages: ShaderStages::PIXEL,
            array_size: 1,
            resource_type: ShaderResourceType::TextureSrv,
            var_type,
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
    fn dynamic_only_signatures_compact_to_set_zero() {
        let desc = ResourceSignatureDesc {
            resources: vec![resource("dyn_buf", ResourceVariableType::Dynamic)],
            ..ResourceSignatureDesc::default()
        };
        let data = assign(&desc).unwrap();
        assert_eq!(data.resources[0].descriptor_set, 0);
        assert_eq!(data.set_sizes, [UNUSED_SET, 1]);
        assert_eq!(data.layout_count(), 1);
    }

    #[test]
    fn mixed_signatures_use_both_sets() {
        let desc = ResourceSignatureDesc {
            resources: vec![
                resource("tex", ResourceVariableType::Static),
                resource("dyn_buf", ResourceVariableType::Dynamic),
                resource("tex2", ResourceVariableType::Mutable),
            ],
            ..ResourceSignatureDesc::default()
        };
        let data = assign(&desc).unwrap();
        assert_eq!(data.resources[0], ResourceAttribs { descriptor_set: 0, binding_index: 0 });
        assert_eq!(data.resources[1], ResourceAttribs { descriptor_set: 1, binding_index: 0 });
        assert_eq!(data.resources[2], ResourceAttribs { descriptor_set: 0, binding_index: 1 });
        assert_eq!(data.set_sizes, [2, 1]);
        assert_eq!(data.layout_count(), 2);
    }

    #[test]
    fn layout_count_accumulates_across_signatures() {
        // Signature A: one static-mutable set with two resources.
        // Signature B: one dynamic set with one resource.
        // Expected spaces 0, 0, 1; registers 0, 1, 0.
        let a = ResourceSignatureDesc {
            resources: vec![
                resource("a0", ResourceVariableType::Static),
                resource("a1", ResourceVariableType::Mutable),
            ],
            ..ResourceSignatureDesc::default()
        };
        let b = ResourceSignatureDesc {
            binding_index: 1,
            resources: vec![resource("b0", ResourceVariableType::Dynamic)],
            ..ResourceSignatureDesc::default()
        };

        let a_res: Vec<SignatureResource> = a.resources.iter().map(owned).collect();
        let b_res: Vec<SignatureResource> = b.resources.iter().map(owned).collect();
        let a_data = BackendSignatureData {
            vulkan: Some(assign(&a).unwrap()),
            ..BackendSignatureData::default()
        };
        let b_data = BackendSignatureData {
            vulkan: Some(assign(&b).unwrap()),
            ..BackendSignatureData::default()
        };

        let views = [
            SignatureView {
                binding_index: 0,
                resources: &a_res,
                immutable_samplers: &[],
                data: &a_data,
            },
            SignatureView {
                binding_index: 1,
                resources: &b_res,
                immutable_samplers: &[],
                data: &b_data,
            },
        ];
        let mut out = Vec::new();
        emit(&views, ShaderStages::all(), &mut out).unwrap();

        let spaces: Vec<u16> = out.iter().map(|b| b.space).collect();
        let registers: Vec<u32> = out.iter().map(|b| b.register).collect();
        assert_eq!(spaces, [0, 0, 1]);
        assert_eq!(registers, [0, 1, 0]);
    }
}
