//! Wire codecs for the archive's descriptor types.
//!
//! Every function here describes a structure once, against the
//! [`SerializerOps`] operation set, and therefore measures, writes and reads
//! with the same code. Resource names are *not* part of an entry's tail;
//! they live in the directory and are attached by the caller after decoding.

use crate::error::Result;
use crate::serializer::SerializerOps;
use crate::types::*;

// --- Small field helpers ---

fn enum8<'a, S, T>(ser: &mut S, v: &mut T) -> Result<()>
where
    S: SerializerOps<'a>,
    T: WireEnum,
{
    let mut raw = v.to_u8();
    ser.u8(&mut raw)?;
    if ser.is_reading() {
        *v = T::from_u8(raw)?;
    }
    Ok(())
}

fn stage_mask<'a, S: SerializerOps<'a>>(ser: &mut S, v: &mut ShaderStages) -> Result<()> {
    let mut raw = v.bits();
    ser.u32(&mut raw)?;
    if ser.is_reading() {
        *v = ShaderStages::from_wire(raw)?;
    }
    Ok(())
}

fn resource_flags<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    v: &mut PipelineResourceFlags,
) -> Result<()> {
    let mut raw = v.bits();
    ser.u8(&mut raw)?;
    if ser.is_reading() {
        *v = PipelineResourceFlags::from_wire(raw)?;
    }
    Ok(())
}

fn resource_state<'a, S: SerializerOps<'a>>(ser: &mut S, v: &mut ResourceState) -> Result<()> {
    let mut raw = v.bits();
    ser.u32(&mut raw)?;
    if ser.is_reading() {
        *v = ResourceState::from_wire(raw)?;
    }
    Ok(())
}

/// Repeat-count sequence: `u32` count followed by the elements.
fn seq<'a, S, T, F>(ser: &mut S, items: &mut Vec<T>, mut element: F) -> Result<()>
where
    S: SerializerOps<'a>,
    T: Default,
    F: FnMut(&mut S, &mut T) -> Result<()>,
{
    let mut count = items.len() as u32;
    ser.u32(&mut count)?;
    if ser.is_reading() {
        items.clear();
        items.resize_with(count as usize, T::default);
    }
    for item in items.iter_mut() {
        element(ser, item)?;
    }
    Ok(())
}

fn option<'a, S, T, F>(ser: &mut S, value: &mut Option<T>, mut inner: F) -> Result<()>
where
    S: SerializerOps<'a>,
    T: Default,
    F: FnMut(&mut S, &mut T) -> Result<()>,
{
    let mut present = value.is_some();
    ser.bool(&mut present)?;
    if ser.is_reading() {
        *value = present.then(T::default);
    }
    if let Some(v) = value.as_mut() {
        inner(ser, v)?;
    }
    Ok(())
}

// --- Resource signatures ---

fn pipeline_resource<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    res: &mut PipelineResourceDesc<'a>,
) -> Result<()> {
    ser.cstr(&mut res.name)?;
    stage_mask(ser, &mut res.shader_stages)?;
    ser.u32(&mut res.array_size)?;
    enum8(ser, &mut res.resource_type)?;
    enum8(ser, &mut res.var_type)?;
    resource_flags(ser, &mut res.flags)
}

fn sampler_desc<'a, S: SerializerOps<'a>>(ser: &mut S, desc: &mut SamplerDesc) -> Result<()> {
    enum8(ser, &mut desc.min_filter)?;
    enum8(ser, &mut desc.mag_filter)?;
    enum8(ser, &mut desc.mip_filter)?;
    enum8(ser, &mut desc.address_u)?;
    enum8(ser, &mut desc.address_v)?;
    enum8(ser, &mut desc.address_w)?;
    ser.f32(&mut desc.mip_lod_bias)?;
    ser.u32(&mut desc.max_anisotropy)?;
    enum8(ser, &mut desc.comparison_func)?;
    for c in desc.border_color.iter_mut() {
        ser.f32(c)?;
    }
    ser.f32(&mut desc.min_lod)?;
    ser.f32(&mut desc.max_lod)
}

fn immutable_sampler<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    sampler: &mut ImmutableSamplerDesc<'a>,
) -> Result<()> {
    stage_mask(ser, &mut sampler.shader_stages)?;
    ser.cstr(&mut sampler.sampler_or_texture_name)?;
    ser.u32(&mut sampler.array_size)?;
    sampler_desc(ser, &mut sampler.desc)
}

/// Signature descriptor tail (the name lives in the directory).
pub fn signature_desc<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    desc: &mut ResourceSignatureDesc<'a>,
) -> Result<()> {
    ser.u8(&mut desc.binding_index)?;
    seq(ser, &mut desc.resources, pipeline_resource)?;
    seq(ser, &mut desc.immutable_samplers, immutable_sampler)
}

// --- Render passes ---

fn attachment_desc<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    att: &mut RenderPassAttachmentDesc,
) -> Result<()> {
    enum8(ser, &mut att.format)?;
    ser.u8(&mut att.sample_count)?;
    enum8(ser, &mut att.load_op)?;
    enum8(ser, &mut att.store_op)?;
    enum8(ser, &mut att.stencil_load_op)?;
    enum8(ser, &mut att.stencil_store_op)?;
    resource_state(ser, &mut att.initial_state)?;
    resource_state(ser, &mut att.final_state)
}

fn attachment_ref<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    r: &mut AttachmentReference,
) -> Result<()> {
    ser.u32(&mut r.attachment_index)?;
    resource_state(ser, &mut r.state)
}

fn subpass_desc<'a, S: SerializerOps<'a>>(ser: &mut S, sp: &mut SubpassDesc) -> Result<()> {
    seq(ser, &mut sp.input_attachments, attachment_ref)?;
    seq(ser, &mut sp.render_targets, attachment_ref)?;
    seq(ser, &mut sp.resolve_attachments, attachment_ref)?;
    option(ser, &mut sp.depth_stencil, attachment_ref)?;
    seq(ser, &mut sp.preserve_attachments, |ser, idx| ser.u32(idx))
}

fn subpass_dependency<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    dep: &mut SubpassDependencyDesc,
) -> Result<()> {
    ser.u32(&mut dep.src_subpass)?;
    ser.u32(&mut dep.dst_subpass)?;
    ser.u32(&mut dep.src_stage_mask)?;
    ser.u32(&mut dep.dst_stage_mask)?;
    ser.u32(&mut dep.src_access_mask)?;
    ser.u32(&mut dep.dst_access_mask)
}

/// Render pass descriptor tail.
pub fn render_pass_desc<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    desc: &mut RenderPassDesc<'a>,
) -> Result<()> {
    seq(ser, &mut desc.attachments, attachment_desc)?;
    seq(ser, &mut desc.subpasses, subpass_desc)?;
    seq(ser, &mut desc.dependencies, subpass_dependency)
}

// --- Pipeline state ---

fn shader_variable<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    var: &mut ShaderVariableDesc<'a>,
) -> Result<()> {
    ser.cstr(&mut var.name)?;
    stage_mask(ser, &mut var.shader_stages)?;
    enum8(ser, &mut var.var_type)
}

fn resource_layout<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    layout: &mut ResourceLayoutDesc<'a>,
) -> Result<()> {
    enum8(ser, &mut layout.default_variable_type)?;
    seq(ser, &mut layout.variables, shader_variable)?;
    seq(ser, &mut layout.immutable_samplers, immutable_sampler)
}

fn pipeline_state_desc<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    desc: &mut PipelineStateDesc<'a>,
) -> Result<()> {
    enum8(ser, &mut desc.pipeline_type)?;
    resource_layout(ser, &mut desc.resource_layout)
}

fn signature_names<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    names: &mut Vec<&'a str>,
) -> Result<()> {
    seq(ser, names, |ser, name| ser.cstr(name))
}

fn blend_state<'a, S: SerializerOps<'a>>(ser: &mut S, blend: &mut BlendStateDesc) -> Result<()> {
    ser.bool(&mut blend.alpha_to_coverage_enable)?;
    ser.bool(&mut blend.independent_blend_enable)?;
    for rt in blend.render_targets.iter_mut() {
        ser.bool(&mut rt.blend_enable)?;
        enum8(ser, &mut rt.src_blend)?;
        enum8(ser, &mut rt.dst_blend)?;
        enum8(ser, &mut rt.blend_op)?;
        enum8(ser, &mut rt.src_blend_alpha)?;
        enum8(ser, &mut rt.dst_blend_alpha)?;
        enum8(ser, &mut rt.blend_op_alpha)?;
        ser.u8(&mut rt.write_mask)?;
    }
    Ok(())
}

fn graphics_desc<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    gfx: &mut GraphicsPipelineDesc,
) -> Result<()> {
    blend_state(ser, &mut gfx.blend)?;

    enum8(ser, &mut gfx.rasterizer.fill_mode)?;
    enum8(ser, &mut gfx.rasterizer.cull_mode)?;
    ser.bool(&mut gfx.rasterizer.front_counter_clockwise)?;
    ser.bool(&mut gfx.rasterizer.depth_clip_enable)?;
    ser.bool(&mut gfx.rasterizer.scissor_enable)?;
    ser.f32(&mut gfx.rasterizer.depth_bias)?;
    ser.f32(&mut gfx.rasterizer.slope_scaled_depth_bias)?;

    ser.bool(&mut gfx.depth_stencil.depth_enable)?;
    ser.bool(&mut gfx.depth_stencil.depth_write_enable)?;
    enum8(ser, &mut gfx.depth_stencil.depth_func)?;
    ser.bool(&mut gfx.depth_stencil.stencil_enable)?;

    seq(ser, &mut gfx.input_layout, |ser, elem| {
        ser.u32(&mut elem.input_index)?;
        ser.u32(&mut elem.buffer_slot)?;
        ser.u32(&mut elem.num_components)?;
        enum8(ser, &mut elem.value_type)?;
        ser.bool(&mut elem.is_normalized)
    })?;

    enum8(ser, &mut gfx.primitive_topology)?;
    ser.u8(&mut gfx.num_render_targets)?;
    for fmt in gfx.rtv_formats.iter_mut() {
        enum8(ser, fmt)?;
    }
    enum8(ser, &mut gfx.dsv_format)?;
    ser.u8(&mut gfx.sample_count)?;
    ser.u8(&mut gfx.subpass_index)
}

/// Common (backend-agnostic) part of a graphics pipeline entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphicsPipelineStateCi<'a> {
    /// Shared pipeline fields.
    pub desc: PipelineStateDesc<'a>,
    /// Fixed-function state.
    pub graphics: GraphicsPipelineDesc,
    /// Names of the pipeline's signatures, ordered by binding index.
    pub signature_names: Vec<&'a str>,
    /// Name of the render pass, empty when the pipeline renders without one.
    pub render_pass_name: &'a str,
}

/// Graphics pipeline entry tail.
pub fn graphics_pso_ci<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    ci: &mut GraphicsPipelineStateCi<'a>,
) -> Result<()> {
    pipeline_state_desc(ser, &mut ci.desc)?;
    graphics_desc(ser, &mut ci.graphics)?;
    signature_names(ser, &mut ci.signature_names)?;
    ser.cstr(&mut ci.render_pass_name)
}

/// Common part of a compute pipeline entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComputePipelineStateCi<'a> {
    /// Shared pipeline fields.
    pub desc: PipelineStateDesc<'a>,
    /// Names of the pipeline's signatures, ordered by binding index.
    pub signature_names: Vec<&'a str>,
}

/// Compute pipeline entry tail.
pub fn compute_pso_ci<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    ci: &mut ComputePipelineStateCi<'a>,
) -> Result<()> {
    pipeline_state_desc(ser, &mut ci.desc)?;
    signature_names(ser, &mut ci.signature_names)
}

/// Common part of a tile pipeline entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TilePipelineStateCi<'a> {
    /// Shared pipeline fields.
    pub desc: PipelineStateDesc<'a>,
    /// Names of the pipeline's signatures, ordered by binding index.
    pub signature_names: Vec<&'a str>,
    /// Number of render targets the tile shader reads.
    pub num_render_targets: u8,
    /// Render target formats.
    pub rtv_formats: [TextureFormat; MAX_RENDER_TARGETS],
    /// MSAA sample count.
    pub sample_count: u8,
}

/// Tile pipeline entry tail.
pub fn tile_pso_ci<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    ci: &mut TilePipelineStateCi<'a>,
) -> Result<()> {
    pipeline_state_desc(ser, &mut ci.desc)?;
    signature_names(ser, &mut ci.signature_names)?;
    ser.u8(&mut ci.num_render_targets)?;
    for fmt in ci.rtv_formats.iter_mut() {
        enum8(ser, fmt)?;
    }
    ser.u8(&mut ci.sample_count)
}

/// Common part of a ray-tracing pipeline entry. Shader group slots hold
/// shader list indices until the unpacker resolves them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RayTracingPipelineStateCi<'a> {
    /// Shared pipeline fields.
    pub desc: PipelineStateDesc<'a>,
    /// Names of the pipeline's signatures, ordered by binding index.
    pub signature_names: Vec<&'a str>,
    /// Maximum ray recursion depth.
    pub max_recursion_depth: u8,
    /// Size of one shader record in the shader binding table.
    pub shader_record_size: u16,
    /// Ray-gen, miss and callable groups.
    pub general_shaders: Vec<RayTracingGeneralShaderGroup<'a>>,
    /// Triangle hit groups.
    pub triangle_hit_shaders: Vec<RayTracingTriangleHitShaderGroup<'a>>,
    /// Procedural hit groups.
    pub procedural_hit_shaders: Vec<RayTracingProceduralHitShaderGroup<'a>>,
}

/// Ray-tracing pipeline entry tail.
pub fn ray_tracing_pso_ci<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    ci: &mut RayTracingPipelineStateCi<'a>,
) -> Result<()> {
    pipeline_state_desc(ser, &mut ci.desc)?;
    signature_names(ser, &mut ci.signature_names)?;
    ser.u8(&mut ci.max_recursion_depth)?;
    ser.u16(&mut ci.shader_record_size)?;
    seq(ser, &mut ci.general_shaders, |ser, group| {
        ser.cstr(&mut group.name)?;
        ser.u32(&mut group.shader)
    })?;
    seq(ser, &mut ci.triangle_hit_shaders, |ser, group| {
        ser.cstr(&mut group.name)?;
        ser.u32(&mut group.closest_hit_shader)?;
        ser.u32(&mut group.any_hit_shader)
    })?;
    seq(ser, &mut ci.procedural_hit_shaders, |ser, group| {
        ser.cstr(&mut group.name)?;
        ser.u32(&mut group.intersection_shader)?;
        ser.u32(&mut group.closest_hit_shader)?;
        ser.u32(&mut group.any_hit_shader)
    })
}

// --- Shaders ---

/// Indices into the archive's shader table, as stored in a pipeline's
/// backend data block.
pub fn shader_indices<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    indices: &mut Vec<u32>,
) -> Result<()> {
    seq(ser, indices, |ser, idx| ser.u32(idx))
}

/// One shader table entry: description followed by the bytecode tail.
pub fn shader_create_info<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    ci: &mut ShaderCreateInfo<'a>,
) -> Result<()> {
    stage_mask(ser, &mut ci.shader_type)?;
    ser.cstr(&mut ci.entry_point)?;
    enum8(ser, &mut ci.source_language)?;
    ser.tail(&mut ci.bytecode)
}

/// Debug-info chunk body: API version tag and source-tree commit hash.
pub fn debug_info<'a, S: SerializerOps<'a>>(
    ser: &mut S,
    api_version: &mut &'a str,
    commit_hash: &mut &'a str,
) -> Result<()> {
    ser.cstr(api_version)?;
    ser.cstr(commit_hash)
}
