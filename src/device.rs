//! The rendering-device contract the unpacker constructs objects against.
//!
//! The archive never talks to a concrete API. It decodes descriptors,
//! resolves references, and hands fully wired create-infos to a
//! [`RenderDevice`] implementation, which returns opaque handle types. The
//! handles must be cheap to clone (the archive memoizes them) and sharable
//! across threads.

use crate::binding::SignatureBackendAttribs;
use crate::codec::{
    ComputePipelineStateCi, GraphicsPipelineStateCi, RayTracingPipelineStateCi,
    TilePipelineStateCi,
};
use crate::error::Result;
use crate::format::Backend;
use crate::types::{RenderPassDesc, ResourceSignatureDesc, ShaderCreateInfo, ShaderStages};

/// A rendering backend able to construct live objects from unpacked
/// archive data.
pub trait RenderDevice {
    /// Shader handle.
    type Shader: Clone + std::fmt::Debug + Send + Sync;
    /// Render pass handle.
    type RenderPass: Clone + std::fmt::Debug + Send + Sync;
    /// Resource signature handle. `PartialEq` backs the mutation-callback
    /// lockout: a callback must not swap the signature list.
    type ResourceSignature: Clone + PartialEq + std::fmt::Debug + Send + Sync;
    /// Pipeline state handle.
    type PipelineState: Clone + std::fmt::Debug + Send + Sync;

    /// Builds a shader from its description and bytecode.
    fn create_shader(&self, ci: &ShaderCreateInfo<'_>) -> Result<Self::Shader>;

    /// Builds a render pass.
    fn create_render_pass(&self, desc: &RenderPassDesc<'_>) -> Result<Self::RenderPass>;

    /// Builds a resource signature from its descriptor and the backend
    /// attributes stored in the archive.
    fn create_resource_signature(
        &self,
        signature: &UnpackedResourceSignature<'_>,
    ) -> Result<Self::ResourceSignature>;

    /// Builds a graphics pipeline.
    fn create_graphics_pipeline(
        &self,
        pipeline: &UnpackedGraphicsPipeline<'_, Self>,
    ) -> Result<Self::PipelineState>
    where
        Self: Sized;

    /// Builds a compute pipeline.
    fn create_compute_pipeline(
        &self,
        pipeline: &UnpackedComputePipeline<'_, Self>,
    ) -> Result<Self::PipelineState>
    where
        Self: Sized;

    /// Builds a tile pipeline.
    fn create_tile_pipeline(
        &self,
        pipeline: &UnpackedTilePipeline<'_, Self>,
    ) -> Result<Self::PipelineState>
    where
        Self: Sized;

    /// Builds a ray-tracing pipeline.
    fn create_ray_tracing_pipeline(
        &self,
        pipeline: &UnpackedRayTracingPipeline<'_, Self>,
    ) -> Result<Self::PipelineState>
    where
        Self: Sized;
}

/// A signature as handed to [`RenderDevice::create_resource_signature`]:
/// the decoded descriptor plus the reader backend's attributes.
#[derive(Debug, Clone)]
pub struct UnpackedResourceSignature<'a> {
    /// Decoded descriptor; the name comes from the directory.
    pub desc: ResourceSignatureDesc<'a>,
    /// The backend this archive reader is bound to.
    pub backend: Backend,
    /// Attributes decoded from the backend's data block.
    pub attribs: SignatureBackendAttribs,
}

/// A shader loaded through the archive's shader cache, tagged with its
/// stage so pipelines can wire it into the right slot.
#[derive(Debug, Clone)]
pub struct LoadedShader<S> {
    /// The shader's stage; exactly one bit.
    pub stage: ShaderStages,
    /// The constructed device shader.
    pub shader: S,
}

/// A graphics pipeline with every reference resolved, ready for device
/// construction.
#[derive(Debug, Clone)]
pub struct UnpackedGraphicsPipeline<'a, D: RenderDevice> {
    /// Decoded common fields.
    pub ci: GraphicsPipelineStateCi<'a>,
    /// Constructed render pass, when `ci.render_pass_name` is non-empty.
    pub render_pass: Option<D::RenderPass>,
    /// Constructed signatures, ordered as `ci.signature_names`.
    pub signatures: Vec<D::ResourceSignature>,
    /// Vertex shader.
    pub vs: Option<D::Shader>,
    /// Pixel shader.
    pub ps: Option<D::Shader>,
    /// Geometry shader.
    pub gs: Option<D::Shader>,
    /// Hull shader.
    pub hs: Option<D::Shader>,
    /// Domain shader.
    pub ds: Option<D::Shader>,
    /// Amplification shader.
    pub amplification: Option<D::Shader>,
    /// Mesh shader.
    pub mesh: Option<D::Shader>,
}

/// A compute pipeline with every reference resolved.
#[derive(Debug, Clone)]
pub struct UnpackedComputePipeline<'a, D: RenderDevice> {
    /// Decoded common fields.
    pub ci: ComputePipelineStateCi<'a>,
    /// Constructed signatures, ordered as `ci.signature_names`.
    pub signatures: Vec<D::ResourceSignature>,
    /// Compute shader.
    pub cs: D::Shader,
}

/// A tile pipeline with every reference resolved.
#[derive(Debug, Clone)]
pub struct UnpackedTilePipeline<'a, D: RenderDevice> {
    /// Decoded common fields.
    pub ci: TilePipelineStateCi<'a>,
    /// Constructed signatures, ordered as `ci.signature_names`.
    pub signatures: Vec<D::ResourceSignature>,
    /// Tile shader.
    pub ts: D::Shader,
}

/// Ray-tracing general group after shader resolution.
#[derive(Debug, Clone)]
pub struct ResolvedGeneralShaderGroup<'a, S> {
    /// Group name.
    pub name: &'a str,
    /// Resolved shader; `None` for the empty-slot sentinel.
    pub shader: Option<S>,
}

/// Ray-tracing triangle hit group after shader resolution.
#[derive(Debug, Clone)]
pub struct ResolvedTriangleHitShaderGroup<'a, S> {
    /// Group name.
    pub name: &'a str,
    /// Closest-hit shader.
    pub closest_hit_shader: Option<S>,
    /// Any-hit shader.
    pub any_hit_shader: Option<S>,
}

/// Ray-tracing procedural hit group after shader resolution.
#[derive(Debug, Clone)]
pub struct ResolvedProceduralHitShaderGroup<'a, S> {
    /// Group name.
    pub name: &'a str,
    /// Intersection shader.
    pub intersection_shader: Option<S>,
    /// Closest-hit shader.
    pub closest_hit_shader: Option<S>,
    /// Any-hit shader.
    pub any_hit_shader: Option<S>,
}

/// A ray-tracing pipeline with every reference resolved. The groups in
/// `ci` still hold raw shader list indices; the resolved groups below are
/// what the device consumes.
#[derive(Debug, Clone)]
pub struct UnpackedRayTracingPipeline<'a, D: RenderDevice> {
    /// Decoded common fields.
    pub ci: RayTracingPipelineStateCi<'a>,
    /// Constructed signatures, ordered as `ci.signature_names`.
    pub signatures: Vec<D::ResourceSignature>,
    /// Resolved general groups.
    pub general_shaders: Vec<ResolvedGeneralShaderGroup<'a, D::Shader>>,
    /// Resolved triangle hit groups.
    pub triangle_hit_shaders: Vec<ResolvedTriangleHitShaderGroup<'a, D::Shader>>,
    /// Resolved procedural hit groups.
    pub procedural_hit_shaders: Vec<ResolvedProceduralHitShaderGroup<'a, D::Shader>>,
}
