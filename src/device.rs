//! The GPU interface the engine renders through.
//!
//! [`GpuDevice`] is the single seam between scene data and the graphics
//! backend: buffers, shader stages, programs with uniform reflection,
//! textures, framebuffers and the fixed-function toggles the render configs
//! drive. Handles are opaque newtypes so a buffer id can never be passed
//! where a texture id is expected.
//!
//! Tests implement the trait with a recording device; a real backend maps
//! each call onto its API one to one.

use anyhow::Result;

/// Opaque handle to a device buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Opaque handle to a device texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Opaque handle to one compiled shader stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u64);

/// Opaque handle to a linked shader program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

/// Opaque handle to a framebuffer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u64);

/// Location of an active uniform within a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferTarget {
    Vertex,
    Index,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveMode {
    Triangles,
    Lines,
}

/// Fixed-function capabilities a render config can toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    DepthTest,
    Blend,
    CullFace,
    StencilTest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullMode {
    Front,
    Back,
}

/// Scalar element type of a texture format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    UnsignedByte,
    HalfFloat,
    Float,
    UnsignedInt,
}

/// Per-format layout used for allocation and upload size checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    pub components: u32,
    pub bytes_per_component: u32,
    pub element_kind: ElementKind,
}

/// The closed set of texture formats the engine allocates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    Rgba16F,
    Rgba32F,
    Depth24,
    Depth32F,
}

impl TextureFormat {
    pub const ALL: [TextureFormat; 5] = [
        TextureFormat::Rgba8,
        TextureFormat::Rgba16F,
        TextureFormat::Rgba32F,
        TextureFormat::Depth24,
        TextureFormat::Depth32F,
    ];

    /// Layout of one texel. Exhaustive so adding a format without its
    /// layout fails to compile.
    pub fn info(self) -> FormatInfo {
        match self {
            TextureFormat::Rgba8 => FormatInfo {
                components: 4,
                bytes_per_component: 1,
                element_kind: ElementKind::UnsignedByte,
            },
            TextureFormat::Rgba16F => FormatInfo {
                components: 4,
                bytes_per_component: 2,
                element_kind: ElementKind::HalfFloat,
            },
            TextureFormat::Rgba32F => FormatInfo {
                components: 4,
                bytes_per_component: 4,
                element_kind: ElementKind::Float,
            },
            TextureFormat::Depth24 => FormatInfo {
                components: 1,
                bytes_per_component: 4,
                element_kind: ElementKind::UnsignedInt,
            },
            TextureFormat::Depth32F => FormatInfo {
                components: 1,
                bytes_per_component: 4,
                element_kind: ElementKind::Float,
            },
        }
    }

    /// Floating-point color formats are the ones eligible for the FBO
    /// fallback to `Rgba8`.
    pub fn is_float_color(self) -> bool {
        matches!(self, TextureFormat::Rgba16F | TextureFormat::Rgba32F)
    }

    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth24 | TextureFormat::Depth32F)
    }

    /// Bytes of one texel, for upload size validation.
    pub fn bytes_per_texel(self) -> u32 {
        let info = self.info();
        info.components * info.bytes_per_component
    }
}

/// Startup consistency check over the format table.
///
/// Depth formats carry one component, color formats four, and every entry
/// reports a non-zero texel size.
pub fn validate_format_table() {
    for format in TextureFormat::ALL {
        let info = format.info();
        let expected = if format.is_depth() { 1 } else { 4 };
        debug_assert_eq!(
            info.components, expected,
            "format {:?} has wrong component count",
            format
        );
        debug_assert!(
            format.bytes_per_texel() > 0,
            "format {:?} has zero texel size",
            format
        );
        debug_assert!(
            !(format.is_depth() && format.is_float_color()),
            "format {:?} claims both depth and float color",
            format
        );
    }
}

/// Dimensions and format of one texture allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// One attribute of an interleaved vertex stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub components: u32,
    pub offset: u32,
    pub stride: u32,
}

/// Result of compiling one shader stage. The handle is valid even when
/// compilation failed so the caller can destroy it uniformly.
#[derive(Clone, Debug)]
pub struct StageOutput {
    pub shader: ShaderId,
    pub ok: bool,
    pub info_log: String,
}

/// Result of linking a program.
#[derive(Clone, Debug)]
pub struct LinkOutput {
    pub program: ProgramId,
    pub ok: bool,
    pub info_log: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    Unsupported,
}

/// A typed uniform write.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
    Int(i32),
}

/// The rendering backend the engine draws through.
pub trait GpuDevice {
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> Result<BufferId>;
    fn update_buffer(&mut self, buffer: BufferId, data: &[u8]);
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> StageOutput;
    fn destroy_shader(&mut self, shader: ShaderId);
    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> LinkOutput;
    fn destroy_program(&mut self, program: ProgramId);
    /// Every active uniform of a linked program with its location.
    fn active_uniforms(&mut self, program: ProgramId) -> Vec<(String, UniformLocation)>;
    fn use_program(&mut self, program: Option<ProgramId>);
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    /// Allocate a texture, optionally uploading initial pixel data.
    fn create_texture(&mut self, desc: &TextureDesc, pixels: Option<&[u8]>) -> Result<TextureId>;
    fn destroy_texture(&mut self, texture: TextureId);
    /// Bind `texture` at `unit`, or unbind the unit when `None`.
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    fn create_framebuffer(&mut self) -> Result<FramebufferId>;
    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId);
    fn attach_depth(&mut self, framebuffer: FramebufferId, texture: TextureId);
    fn framebuffer_status(&mut self, framebuffer: FramebufferId) -> FramebufferStatus;
    /// Bind `framebuffer` as the draw target, or the default target when `None`.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    fn set_capability(&mut self, capability: Capability, enabled: bool);
    fn set_depth_mask(&mut self, enabled: bool);
    fn set_color_mask(&mut self, enabled: bool);
    fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor);
    fn set_cull_face(&mut self, mode: CullMode);
    fn viewport(&mut self, width: u32, height: u32);
    fn clear(&mut self, color: bool, depth: bool);

    #[allow(clippy::too_many_arguments)]
    fn draw_indexed(
        &mut self,
        mode: PrimitiveMode,
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        attributes: &[VertexAttribute],
        first: usize,
        count: usize,
    );
    fn draw_arrays(
        &mut self,
        mode: PrimitiveMode,
        vertex_buffer: BufferId,
        attributes: &[VertexAttribute],
        first: usize,
        count: usize,
    );
}
