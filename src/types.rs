//! Backend-agnostic descriptor types shared by the writer and the reader.
//!
//! Everything here is plain data: resource signatures, render pass and
//! pipeline state descriptions the way they travel through the archive.
//! Decoded descriptors borrow their strings from the unpack arena;
//! variable-length tails are owned `Vec`s.

use crate::error::{ArchiveError, Result};

/// Declares a `u8`-repr enum together with its strict wire decoding.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $Name:ident {
            $($(#[$vmeta:meta])* $Variant:ident = $val:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        $vis enum $Name {
            $($(#[$vmeta])* $Variant = $val),+
        }

        impl WireEnum for $Name {
            fn to_u8(self) -> u8 {
                self as u8
            }

            fn from_u8(raw: u8) -> Result<Self> {
                match raw {
                    $($val => Ok(Self::$Variant),)+
                    _ => Err(ArchiveError::DecodeUnderflow(format!(
                        concat!("invalid ", stringify!($Name), " value {}"),
                        raw
                    ))),
                }
            }
        }
    };
}

/// Wire conversion for `u8`-repr enums; out-of-range values are decode
/// errors, never silently accepted.
pub(crate) trait WireEnum: Copy {
    fn to_u8(self) -> u8;
    fn from_u8(raw: u8) -> Result<Self>
    where
        Self: Sized;
}

bitflags::bitflags! {
    /// Shader stages a resource or shader participates in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex shader.
        const VERTEX = 1 << 0;
        /// Pixel (fragment) shader.
        const PIXEL = 1 << 1;
        /// Geometry shader.
        const GEOMETRY = 1 << 2;
        /// Hull (tessellation control) shader.
        const HULL = 1 << 3;
        /// Domain (tessellation evaluation) shader.
        const DOMAIN = 1 << 4;
        /// Compute shader.
        const COMPUTE = 1 << 5;
        /// Amplification (task) shader.
        const AMPLIFICATION = 1 << 6;
        /// Mesh shader.
        const MESH = 1 << 7;
        /// Tile shader (Metal).
        const TILE = 1 << 8;
        /// Ray generation shader.
        const RAY_GEN = 1 << 9;
        /// Ray miss shader.
        const RAY_MISS = 1 << 10;
        /// Closest-hit shader.
        const RAY_CLOSEST_HIT = 1 << 11;
        /// Any-hit shader.
        const RAY_ANY_HIT = 1 << 12;
        /// Intersection shader.
        const RAY_INTERSECTION = 1 << 13;
        /// Callable shader.
        const CALLABLE = 1 << 14;

        /// Every graphics-pipeline stage.
        const ALL_GRAPHICS = Self::VERTEX.bits()
            | Self::PIXEL.bits()
            | Self::GEOMETRY.bits()
            | Self::HULL.bits()
            | Self::DOMAIN.bits()
            | Self::AMPLIFICATION.bits()
            | Self::MESH.bits();
    }
}

impl Default for ShaderStages {
    fn default() -> Self {
        Self::empty()
    }
}

impl ShaderStages {
    /// Removes and returns the lowest set stage bit.
    pub fn extract_lsb(&mut self) -> ShaderStages {
        let bits = self.bits();
        let lsb = bits & bits.wrapping_neg();
        *self = ShaderStages::from_bits_retain(bits & !lsb);
        ShaderStages::from_bits_retain(lsb)
    }

    /// Strict wire decoding: unknown bits are a decode error.
    pub(crate) fn from_wire(raw: u32) -> Result<Self> {
        Self::from_bits(raw).ok_or_else(|| {
            ArchiveError::DecodeUnderflow(format!("invalid shader stage mask 0x{raw:x}"))
        })
    }
}

wire_enum! {
    /// The kind of pipeline a PSO entry describes.
    pub enum PipelineType {
        /// Rasterization pipeline.
        #[default]
        Graphics = 0,
        /// Compute pipeline.
        Compute = 1,
        /// Ray-tracing pipeline.
        RayTracing = 2,
        /// Tile pipeline (Metal).
        Tile = 3,
    }
}

wire_enum! {
    /// The kind of shader-visible slot a signature resource occupies.
    pub enum ShaderResourceType {
        /// Constant (uniform) buffer.
        #[default]
        ConstantBuffer = 0,
        /// Read-only texture view.
        TextureSrv = 1,
        /// Read-only formatted or structured buffer view.
        BufferSrv = 2,
        /// Read-write texture view.
        TextureUav = 3,
        /// Read-write buffer view.
        BufferUav = 4,
        /// Separate sampler.
        Sampler = 5,
        /// Framebuffer fetch / input attachment.
        InputAttachment = 6,
        /// Acceleration structure.
        AccelStruct = 7,
    }
}

wire_enum! {
    /// How often a resource binding is expected to change.
    pub enum ResourceVariableType {
        /// Bound once at signature creation.
        #[default]
        Static = 0,
        /// Rebindable between draws, same descriptor set as static.
        Mutable = 1,
        /// Rebindable per draw; lives in the dynamic descriptor set.
        Dynamic = 2,
    }
}

bitflags::bitflags! {
    /// Modifier flags of a signature resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineResourceFlags: u8 {
        /// The resource never binds dynamic-offset buffers.
        const NO_DYNAMIC_BUFFERS = 1 << 0;
        /// Unbounded array; binding emission reports array size 0.
        const RUNTIME_ARRAY = 1 << 1;
        /// Texture combined with its sampler (GL-style).
        const COMBINED_SAMPLER = 1 << 2;
    }
}

impl Default for PipelineResourceFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl PipelineResourceFlags {
    pub(crate) fn from_wire(raw: u8) -> Result<Self> {
        Self::from_bits(raw).ok_or_else(|| {
            ArchiveError::DecodeUnderflow(format!("invalid resource flags 0x{raw:x}"))
        })
    }
}

/// One shader-visible resource slot declared by a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineResourceDesc<'a> {
    /// Resource name as it appears in shader source.
    pub name: &'a str,
    /// Stages that can see this resource.
    pub shader_stages: ShaderStages,
    /// Number of array elements; 1 for non-arrays.
    pub array_size: u32,
    /// Slot kind.
    pub resource_type: ShaderResourceType,
    /// Binding frequency; decides Vulkan descriptor-set membership.
    pub var_type: ResourceVariableType,
    /// Modifier flags.
    pub flags: PipelineResourceFlags,
}

wire_enum! {
    /// Texture filtering.
    pub enum FilterType {
        /// Nearest-neighbour.
        #[default]
        Point = 0,
        /// Linear interpolation.
        Linear = 1,
        /// Anisotropic filtering.
        Anisotropic = 2,
    }
}

wire_enum! {
    /// Texture addressing outside `[0, 1)`.
    pub enum AddressMode {
        /// Repeat the texture.
        #[default]
        Wrap = 0,
        /// Mirror on every repeat.
        Mirror = 1,
        /// Clamp to the edge texel.
        Clamp = 2,
        /// Use the border color.
        Border = 3,
    }
}

wire_enum! {
    /// Comparison function for depth tests and comparison samplers.
    pub enum ComparisonFunc {
        /// Never passes.
        Never = 0,
        /// Passes when source < destination.
        #[default]
        Less = 1,
        /// Passes on equality.
        Equal = 2,
        /// Passes when source <= destination.
        LessEqual = 3,
        /// Passes when source > destination.
        Greater = 4,
        /// Passes on inequality.
        NotEqual = 5,
        /// Passes when source >= destination.
        GreaterEqual = 6,
        /// Always passes.
        Always = 7,
    }
}

/// Sampler state description.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplerDesc {
    /// Minification filter.
    pub min_filter: FilterType,
    /// Magnification filter.
    pub mag_filter: FilterType,
    /// Mip-level filter.
    pub mip_filter: FilterType,
    /// Addressing along U.
    pub address_u: AddressMode,
    /// Addressing along V.
    pub address_v: AddressMode,
    /// Addressing along W.
    pub address_w: AddressMode,
    /// Mip LOD bias.
    pub mip_lod_bias: f32,
    /// Maximum anisotropy; 0 disables anisotropic filtering.
    pub max_anisotropy: u32,
    /// Comparison function for comparison samplers.
    pub comparison_func: ComparisonFunc,
    /// Border color for [`AddressMode::Border`].
    pub border_color: [f32; 4],
    /// Minimum LOD clamp.
    pub min_lod: f32,
    /// Maximum LOD clamp.
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: FilterType::Linear,
            mag_filter: FilterType::Linear,
            mip_filter: FilterType::Linear,
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            address_w: AddressMode::Clamp,
            mip_lod_bias: 0.0,
            max_anisotropy: 0,
            comparison_func: ComparisonFunc::Never,
            border_color: [0.0; 4],
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

/// A sampler baked into a signature or a resource layout.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImmutableSamplerDesc<'a> {
    /// Stages that can see the sampler.
    pub shader_stages: ShaderStages,
    /// The sampler's own name, or the texture name it is assigned to when
    /// combined texture samplers are used.
    pub sampler_or_texture_name: &'a str,
    /// Number of array elements; 1 for non-arrays.
    pub array_size: u32,
    /// Sampler state.
    pub desc: SamplerDesc,
}

/// A reusable declaration of shader-visible resource slots.
///
/// The `binding_index` is the signature's position within the ordered
/// signature set of a pipeline; it is distinct from any per-resource
/// register or space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceSignatureDesc<'a> {
    /// Signature name; unique within the archive's signature directory.
    pub name: &'a str,
    /// Declared resources, in emission order.
    pub resources: Vec<PipelineResourceDesc<'a>>,
    /// Immutable samplers, emitted after all resources.
    pub immutable_samplers: Vec<ImmutableSamplerDesc<'a>>,
    /// Position within a pipeline's signature set, `0..MAX_RESOURCE_SIGNATURES`.
    pub binding_index: u8,
}

// --- Render passes ---

wire_enum! {
    /// Texture formats the archive understands for attachments.
    pub enum TextureFormat {
        /// No format / unused slot.
        #[default]
        Unknown = 0,
        /// 8-bit single channel, normalized.
        R8Unorm = 1,
        /// 8-bit RGBA, normalized.
        Rgba8Unorm = 2,
        /// 8-bit BGRA, normalized.
        Bgra8Unorm = 3,
        /// 8-bit RGBA, sRGB.
        Rgba8UnormSrgb = 4,
        /// 16-bit float RG.
        Rg16Float = 5,
        /// 16-bit float RGBA.
        Rgba16Float = 6,
        /// 32-bit float single channel.
        R32Float = 7,
        /// 32-bit float RGBA.
        Rgba32Float = 8,
        /// 10-10-10-2 RGBA, normalized.
        Rgb10A2Unorm = 9,
        /// 32-bit float depth.
        D32Float = 10,
        /// 24-bit depth with 8-bit stencil.
        D24UnormS8Uint = 11,
    }
}

wire_enum! {
    /// What happens to an attachment's contents at subpass begin.
    pub enum AttachmentLoadOp {
        /// Preserve the previous contents.
        #[default]
        Load = 0,
        /// Clear to a pipeline-provided value.
        Clear = 1,
        /// Contents are undefined.
        Discard = 2,
    }
}

wire_enum! {
    /// What happens to an attachment's contents at subpass end.
    pub enum AttachmentStoreOp {
        /// Write results to memory.
        #[default]
        Store = 0,
        /// Results may be dropped.
        Discard = 1,
    }
}

bitflags::bitflags! {
    /// Backend-agnostic resource states used for attachment transitions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceState: u32 {
        /// Render target output.
        const RENDER_TARGET = 1 << 0;
        /// Read in a shader.
        const SHADER_RESOURCE = 1 << 1;
        /// Depth writes enabled.
        const DEPTH_WRITE = 1 << 2;
        /// Depth reads only.
        const DEPTH_READ = 1 << 3;
        /// Read as an input attachment.
        const INPUT_ATTACHMENT = 1 << 4;
        /// Read-write access from a shader.
        const UNORDERED_ACCESS = 1 << 5;
        /// Source of a copy or resolve.
        const COPY_SOURCE = 1 << 6;
        /// Destination of a copy or resolve.
        const COPY_DEST = 1 << 7;
        /// Presentable to a swap chain.
        const PRESENT = 1 << 8;
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::empty()
    }
}

impl ResourceState {
    pub(crate) fn from_wire(raw: u32) -> Result<Self> {
        Self::from_bits(raw).ok_or_else(|| {
            ArchiveError::DecodeUnderflow(format!("invalid resource state 0x{raw:x}"))
        })
    }
}

/// Marks an unused attachment slot in an [`AttachmentReference`].
pub const ATTACHMENT_UNUSED: u32 = u32::MAX;

/// One attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderPassAttachmentDesc {
    /// Pixel format.
    pub format: TextureFormat,
    /// MSAA sample count.
    pub sample_count: u8,
    /// Color/depth load behaviour.
    pub load_op: AttachmentLoadOp,
    /// Color/depth store behaviour.
    pub store_op: AttachmentStoreOp,
    /// Stencil load behaviour.
    pub stencil_load_op: AttachmentLoadOp,
    /// Stencil store behaviour.
    pub stencil_store_op: AttachmentStoreOp,
    /// State the attachment is in when the pass begins.
    pub initial_state: ResourceState,
    /// State the attachment is left in when the pass ends.
    pub final_state: ResourceState,
}

/// Reference from a subpass to an attachment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachmentReference {
    /// Index into the render pass attachment array, or
    /// [`ATTACHMENT_UNUSED`].
    pub attachment_index: u32,
    /// State the attachment must be in during the subpass.
    pub state: ResourceState,
}

/// One subpass of a render pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubpassDesc {
    /// Attachments read as input attachments.
    pub input_attachments: Vec<AttachmentReference>,
    /// Color render targets.
    pub render_targets: Vec<AttachmentReference>,
    /// MSAA resolve destinations; empty, or one per render target.
    pub resolve_attachments: Vec<AttachmentReference>,
    /// Depth-stencil attachment, if any.
    pub depth_stencil: Option<AttachmentReference>,
    /// Attachment indices whose contents must be preserved across this
    /// subpass.
    pub preserve_attachments: Vec<u32>,
}

/// Marks an external dependency endpoint in a [`SubpassDependencyDesc`].
pub const SUBPASS_EXTERNAL: u32 = u32::MAX;

/// Execution/memory dependency between two subpasses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubpassDependencyDesc {
    /// Producing subpass, or [`SUBPASS_EXTERNAL`].
    pub src_subpass: u32,
    /// Consuming subpass, or [`SUBPASS_EXTERNAL`].
    pub dst_subpass: u32,
    /// Source pipeline stage mask (backend-agnostic bits).
    pub src_stage_mask: u32,
    /// Destination pipeline stage mask.
    pub dst_stage_mask: u32,
    /// Source access mask.
    pub src_access_mask: u32,
    /// Destination access mask.
    pub dst_access_mask: u32,
}

/// Full render pass description.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderPassDesc<'a> {
    /// Render pass name; unique within the archive's render pass directory.
    pub name: &'a str,
    /// Attachment slots.
    pub attachments: Vec<RenderPassAttachmentDesc>,
    /// Subpasses; at least one.
    pub subpasses: Vec<SubpassDesc>,
    /// Inter-subpass dependencies.
    pub dependencies: Vec<SubpassDependencyDesc>,
}

// --- Pipeline state ---

wire_enum! {
    /// Primitive assembly mode.
    pub enum PrimitiveTopology {
        /// Independent triangles.
        #[default]
        TriangleList = 0,
        /// Triangle strip.
        TriangleStrip = 1,
        /// Independent points.
        PointList = 2,
        /// Independent lines.
        LineList = 3,
        /// Tessellation patches.
        PatchList = 4,
    }
}

wire_enum! {
    /// Polygon rasterization mode.
    pub enum FillMode {
        /// Filled polygons.
        #[default]
        Solid = 0,
        /// Edges only.
        Wireframe = 1,
    }
}

wire_enum! {
    /// Face culling.
    pub enum CullMode {
        /// No culling.
        None = 0,
        /// Cull front faces.
        Front = 1,
        /// Cull back faces.
        #[default]
        Back = 2,
    }
}

wire_enum! {
    /// Blend factor.
    pub enum BlendFactor {
        /// 0.
        #[default]
        Zero = 0,
        /// 1.
        One = 1,
        /// Source color.
        SrcColor = 2,
        /// 1 - source color.
        InvSrcColor = 3,
        /// Source alpha.
        SrcAlpha = 4,
        /// 1 - source alpha.
        InvSrcAlpha = 5,
        /// Destination color.
        DstColor = 6,
        /// 1 - destination color.
        InvDstColor = 7,
        /// Destination alpha.
        DstAlpha = 8,
        /// 1 - destination alpha.
        InvDstAlpha = 9,
    }
}

wire_enum! {
    /// Blend operation.
    pub enum BlendOp {
        /// src + dst.
        #[default]
        Add = 0,
        /// src - dst.
        Subtract = 1,
        /// dst - src.
        RevSubtract = 2,
        /// min(src, dst).
        Min = 3,
        /// max(src, dst).
        Max = 4,
    }
}

/// Blend state of one render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderTargetBlendDesc {
    /// Enables blending for this target.
    pub blend_enable: bool,
    /// Source color factor.
    pub src_blend: BlendFactor,
    /// Destination color factor.
    pub dst_blend: BlendFactor,
    /// Color operation.
    pub blend_op: BlendOp,
    /// Source alpha factor.
    pub src_blend_alpha: BlendFactor,
    /// Destination alpha factor.
    pub dst_blend_alpha: BlendFactor,
    /// Alpha operation.
    pub blend_op_alpha: BlendOp,
    /// RGBA write mask, low four bits.
    pub write_mask: u8,
}

impl Default for RenderTargetBlendDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: BlendFactor::One,
            dst_blend: BlendFactor::Zero,
            blend_op: BlendOp::Add,
            src_blend_alpha: BlendFactor::One,
            dst_blend_alpha: BlendFactor::Zero,
            blend_op_alpha: BlendOp::Add,
            write_mask: 0xF,
        }
    }
}

/// Maximum number of simultaneous render targets.
pub const MAX_RENDER_TARGETS: usize = 8;

/// Output-merger blend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlendStateDesc {
    /// Alpha-to-coverage.
    pub alpha_to_coverage_enable: bool,
    /// Use per-target blend state instead of target 0 for all.
    pub independent_blend_enable: bool,
    /// Per-target state.
    pub render_targets: [RenderTargetBlendDesc; MAX_RENDER_TARGETS],
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RasterizerStateDesc {
    /// Polygon mode.
    pub fill_mode: FillMode,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Counter-clockwise front faces.
    pub front_counter_clockwise: bool,
    /// Clamp depth instead of clipping.
    pub depth_clip_enable: bool,
    /// Scissor test.
    pub scissor_enable: bool,
    /// Constant depth bias.
    pub depth_bias: f32,
    /// Slope-scaled depth bias.
    pub slope_scaled_depth_bias: f32,
}

impl Default for RasterizerStateDesc {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_clip_enable: true,
            scissor_enable: false,
            depth_bias: 0.0,
            slope_scaled_depth_bias: 0.0,
        }
    }
}

/// Depth-stencil state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DepthStencilStateDesc {
    /// Depth test.
    pub depth_enable: bool,
    /// Depth writes.
    pub depth_write_enable: bool,
    /// Depth comparison.
    pub depth_func: ComparisonFunc,
    /// Stencil test.
    pub stencil_enable: bool,
}

impl Default for DepthStencilStateDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_enable: true,
            depth_func: ComparisonFunc::Less,
            stencil_enable: false,
        }
    }
}

wire_enum! {
    /// Component type of a vertex attribute.
    pub enum ValueType {
        /// 8-bit signed integer.
        Int8 = 0,
        /// 16-bit signed integer.
        Int16 = 1,
        /// 32-bit signed integer.
        Int32 = 2,
        /// 8-bit unsigned integer.
        Uint8 = 3,
        /// 16-bit unsigned integer.
        Uint16 = 4,
        /// 32-bit unsigned integer.
        Uint32 = 5,
        /// Half float.
        Float16 = 6,
        /// Single-precision float.
        #[default]
        Float32 = 7,
    }
}

/// One vertex input attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LayoutElement {
    /// Attribute location.
    pub input_index: u32,
    /// Vertex buffer slot.
    pub buffer_slot: u32,
    /// Components per element, 1-4.
    pub num_components: u32,
    /// Component type.
    pub value_type: ValueType,
    /// Normalize integer components to `[0, 1]` / `[-1, 1]`.
    pub is_normalized: bool,
}

impl Default for LayoutElement {
    fn default() -> Self {
        Self {
            input_index: 0,
            buffer_slot: 0,
            num_components: 4,
            value_type: ValueType::Float32,
            is_normalized: false,
        }
    }
}

/// Default binding behaviour of shader variables not listed in a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderVariableDesc<'a> {
    /// Variable name.
    pub name: &'a str,
    /// Stages the override applies to.
    pub shader_stages: ShaderStages,
    /// Binding frequency override.
    pub var_type: ResourceVariableType,
}

/// Resource layout of a pipeline that uses no explicit signatures.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceLayoutDesc<'a> {
    /// Binding frequency for variables without an override.
    pub default_variable_type: ResourceVariableType,
    /// Per-variable overrides.
    pub variables: Vec<ShaderVariableDesc<'a>>,
    /// Immutable samplers.
    pub immutable_samplers: Vec<ImmutableSamplerDesc<'a>>,
}

/// Fields common to every pipeline kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineStateDesc<'a> {
    /// Pipeline name; unique within its kind's directory.
    pub name: &'a str,
    /// Pipeline kind; locked against mutation-callback changes.
    pub pipeline_type: PipelineType,
    /// Implicit resource layout; locked against mutation-callback changes.
    pub resource_layout: ResourceLayoutDesc<'a>,
}

/// Graphics-specific fixed-function state.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDesc {
    /// Blend state.
    pub blend: BlendStateDesc,
    /// Rasterizer state.
    pub rasterizer: RasterizerStateDesc,
    /// Depth-stencil state.
    pub depth_stencil: DepthStencilStateDesc,
    /// Vertex input layout.
    pub input_layout: Vec<LayoutElement>,
    /// Primitive assembly.
    pub primitive_topology: PrimitiveTopology,
    /// Number of bound render targets.
    pub num_render_targets: u8,
    /// Render target formats; slots past `num_render_targets` are
    /// [`TextureFormat::Unknown`].
    pub rtv_formats: [TextureFormat; MAX_RENDER_TARGETS],
    /// Depth-stencil format.
    pub dsv_format: TextureFormat,
    /// MSAA sample count.
    pub sample_count: u8,
    /// Subpass of the render pass this pipeline is built for.
    pub subpass_index: u8,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            blend: BlendStateDesc::default(),
            rasterizer: RasterizerStateDesc::default(),
            depth_stencil: DepthStencilStateDesc::default(),
            input_layout: Vec::new(),
            primitive_topology: PrimitiveTopology::TriangleList,
            num_render_targets: 0,
            rtv_formats: [TextureFormat::Unknown; MAX_RENDER_TARGETS],
            dsv_format: TextureFormat::Unknown,
            sample_count: 1,
            subpass_index: 0,
        }
    }
}

/// Sentinel shader index meaning "no shader" in a ray-tracing group slot.
pub const NO_SHADER_INDEX: u32 = u32::MAX;

/// Ray-tracing general group (ray-gen, miss, callable) as stored.
///
/// `shader` indexes the pipeline's shader list, [`NO_SHADER_INDEX`] for an
/// empty slot. Indices collapse to device shaders during unpacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayTracingGeneralShaderGroup<'a> {
    /// Group name used to look up shader-binding-table entries.
    pub name: &'a str,
    /// Shader list index.
    pub shader: u32,
}

impl Default for RayTracingGeneralShaderGroup<'_> {
    fn default() -> Self {
        Self {
            name: "",
            shader: NO_SHADER_INDEX,
        }
    }
}

/// Ray-tracing triangle hit group as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayTracingTriangleHitShaderGroup<'a> {
    /// Group name.
    pub name: &'a str,
    /// Closest-hit shader list index.
    pub closest_hit_shader: u32,
    /// Any-hit shader list index, [`NO_SHADER_INDEX`] if absent.
    pub any_hit_shader: u32,
}

impl Default for RayTracingTriangleHitShaderGroup<'_> {
    fn default() -> Self {
        Self {
            name: "",
            closest_hit_shader: NO_SHADER_INDEX,
            any_hit_shader: NO_SHADER_INDEX,
        }
    }
}

/// Ray-tracing procedural hit group as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayTracingProceduralHitShaderGroup<'a> {
    /// Group name.
    pub name: &'a str,
    /// Intersection shader list index.
    pub intersection_shader: u32,
    /// Closest-hit shader list index, [`NO_SHADER_INDEX`] if absent.
    pub closest_hit_shader: u32,
    /// Any-hit shader list index, [`NO_SHADER_INDEX`] if absent.
    pub any_hit_shader: u32,
}

impl Default for RayTracingProceduralHitShaderGroup<'_> {
    fn default() -> Self {
        Self {
            name: "",
            intersection_shader: NO_SHADER_INDEX,
            closest_hit_shader: NO_SHADER_INDEX,
            any_hit_shader: NO_SHADER_INDEX,
        }
    }
}

wire_enum! {
    /// Language the shader was authored in.
    pub enum ShaderSourceLanguage {
        /// Whatever the target backend's default is.
        #[default]
        Default = 0,
        /// HLSL.
        Hlsl = 1,
        /// GLSL.
        Glsl = 2,
        /// Metal shading language.
        Msl = 3,
    }
}

/// Shader description plus its compiled artifact as stored per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderCreateInfo<'a> {
    /// Shader stage; exactly one bit.
    pub shader_type: ShaderStages,
    /// Entry point name.
    pub entry_point: &'a str,
    /// Source language the bytecode was compiled from.
    pub source_language: ShaderSourceLanguage,
    /// Compiled bytecode for the reader's backend; the trailing bytes of
    /// the shader entry.
    pub bytecode: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_lsb_walks_stages_in_order() {
        let mut stages = ShaderStages::VERTEX | ShaderStages::PIXEL | ShaderStages::COMPUTE;
        assert_eq!(stages.extract_lsb(), ShaderStages::VERTEX);
        assert_eq!(stages.extract_lsb(), ShaderStages::PIXEL);
        assert_eq!(stages.extract_lsb(), ShaderStages::COMPUTE);
        assert!(stages.is_empty());
        assert!(stages.extract_lsb().is_empty());
    }

    #[test]
    fn wire_enums_reject_out_of_range_values() {
        assert!(ShaderResourceType::from_u8(3).is_ok());
        assert!(matches!(
            ShaderResourceType::from_u8(200),
            Err(ArchiveError::DecodeUnderflow(_))
        ));
        assert!(matches!(
            PipelineType::from_u8(4),
            Err(ArchiveError::DecodeUnderflow(_))
        ));
    }

    #[test]
    fn stage_mask_decoding_is_strict() {
        assert!(ShaderStages::from_wire(ShaderStages::ALL_GRAPHICS.bits()).is_ok());
        assert!(ShaderStages::from_wire(1 << 31).is_err());
    }
}
