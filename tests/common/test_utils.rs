//! Shared fakes for the integration tests: a recording GPU device and an
//! asset source the test drives by hand.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::Result;
use prism_ngin::device::{
    BlendFactor, BufferId, BufferTarget, Capability, CullMode, FramebufferId, FramebufferStatus,
    GpuDevice, LinkOutput, PrimitiveMode, ProgramId, ShaderId, ShaderStage, StageOutput,
    TextureDesc, TextureFormat, TextureId, UniformLocation, UniformValue, VertexAttribute,
};
use prism_ngin::resources::{AssetSource, CompletionSender, FetchCompletion};

/// A shader source containing this marker fails to compile on the fake
/// device, with the marker echoed back in the info log.
pub const COMPILE_ERROR_MARKER: &str = "SYNTAX_ERROR";

/// Route engine logs through the test harness (`RUST_LOG=debug` to see them).
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Debug)]
pub struct DrawCall {
    pub mode: PrimitiveMode,
    pub indexed: bool,
    pub first: usize,
    pub count: usize,
}

/// Recording implementation of [`GpuDevice`].
///
/// Handles are monotonically increasing, uniforms are reflected by scanning
/// the shader source for `uniform <type> <name>;` lines, and every state
/// change lands in a log the test can assert over.
#[derive(Default)]
pub struct TraceDevice {
    next_id: u64,

    pub buffers: HashMap<BufferId, (BufferTarget, Vec<u8>)>,
    pub buffer_creates: usize,
    pub destroyed_buffers: Vec<BufferId>,

    shader_sources: HashMap<ShaderId, String>,
    pub live_programs: Vec<ProgramId>,
    pub destroyed_programs: Vec<ProgramId>,
    pub used_programs: Vec<Option<ProgramId>>,
    program_uniforms: HashMap<ProgramId, Vec<(String, UniformLocation)>>,
    uniform_names: HashMap<UniformLocation, String>,
    pub uniform_writes: Vec<(String, UniformValue)>,

    pub texture_formats: HashMap<TextureId, TextureFormat>,
    pub texture_uploads: HashMap<TextureId, usize>,
    pub destroyed_textures: Vec<TextureId>,
    pub texture_binds: Vec<(u32, Option<TextureId>)>,

    /// Formats whose color attachment makes the framebuffer incomplete.
    pub reject_color_formats: Vec<TextureFormat>,
    framebuffer_color: HashMap<FramebufferId, TextureId>,
    framebuffer_depth: HashMap<FramebufferId, TextureId>,
    pub destroyed_framebuffers: Vec<FramebufferId>,
    pub framebuffer_binds: Vec<Option<FramebufferId>>,

    pub capability_log: Vec<(Capability, bool)>,
    pub depth_mask_log: Vec<bool>,
    pub color_mask_log: Vec<bool>,
    pub blend_log: Vec<(BlendFactor, BlendFactor)>,
    pub cull_log: Vec<CullMode>,
    pub viewport_log: Vec<(u32, u32)>,
    pub clear_log: Vec<(bool, bool)>,
    pub draws: Vec<DrawCall>,
}

impl TraceDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device on which every floating-point color attachment comes back
    /// incomplete, forcing the FBO fallback path.
    pub fn rejecting_float_color() -> Self {
        Self {
            reject_color_formats: vec![TextureFormat::Rgba16F, TextureFormat::Rgba32F],
            ..Self::default()
        }
    }

    fn fresh(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Last value written to the named uniform, across all programs.
    pub fn last_uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniform_writes
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|&(_, v)| v)
    }

    pub fn uniform_was_written(&self, name: &str) -> bool {
        self.uniform_writes.iter().any(|(n, _)| n == name)
    }

    /// Texture currently bound at `unit`, following the bind log.
    pub fn bound_texture(&self, unit: u32) -> Option<TextureId> {
        self.texture_binds
            .iter()
            .rev()
            .find(|(u, _)| *u == unit)
            .and_then(|&(_, t)| t)
    }
}

/// Pull `uniform <type> <name>;` declarations out of a shader source.
fn scan_uniforms(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in source.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("uniform") {
            continue;
        }
        let (Some(_ty), Some(name)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        let name = name.trim_end_matches(';');
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

impl GpuDevice for TraceDevice {
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> Result<BufferId> {
        let id = BufferId(self.fresh());
        self.buffers.insert(id, (target, data.to_vec()));
        self.buffer_creates += 1;
        Ok(id)
    }

    fn update_buffer(&mut self, buffer: BufferId, data: &[u8]) {
        if let Some((_, contents)) = self.buffers.get_mut(&buffer) {
            *contents = data.to_vec();
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.destroyed_buffers.push(buffer);
    }

    fn compile_shader(&mut self, _stage: ShaderStage, source: &str) -> StageOutput {
        let shader = ShaderId(self.fresh());
        let ok = !source.contains(COMPILE_ERROR_MARKER);
        self.shader_sources.insert(shader, source.to_string());
        StageOutput {
            shader,
            ok,
            info_log: if ok {
                String::new()
            } else {
                format!("0:1: {}", COMPILE_ERROR_MARKER)
            },
        }
    }

    fn destroy_shader(&mut self, shader: ShaderId) {
        self.shader_sources.remove(&shader);
    }

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> LinkOutput {
        let program = ProgramId(self.fresh());
        let mut uniforms: Vec<(String, UniformLocation)> = Vec::new();
        for shader in [vertex, fragment] {
            let Some(source) = self.shader_sources.get(&shader).cloned() else {
                continue;
            };
            for name in scan_uniforms(&source) {
                if uniforms.iter().any(|(n, _)| *n == name) {
                    continue;
                }
                let location = UniformLocation(self.fresh());
                self.uniform_names.insert(location, name.clone());
                uniforms.push((name, location));
            }
        }
        self.program_uniforms.insert(program, uniforms);
        self.live_programs.push(program);
        LinkOutput {
            program,
            ok: true,
            info_log: String::new(),
        }
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.program_uniforms.remove(&program);
        self.live_programs.retain(|&p| p != program);
        self.destroyed_programs.push(program);
    }

    fn active_uniforms(&mut self, program: ProgramId) -> Vec<(String, UniformLocation)> {
        self.program_uniforms
            .get(&program)
            .cloned()
            .unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.used_programs.push(program);
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let name = self
            .uniform_names
            .get(&location)
            .cloned()
            .unwrap_or_else(|| format!("<unknown:{}>", location.0));
        self.uniform_writes.push((name, value));
    }

    fn create_texture(&mut self, desc: &TextureDesc, pixels: Option<&[u8]>) -> Result<TextureId> {
        let id = TextureId(self.fresh());
        self.texture_formats.insert(id, desc.format);
        if let Some(pixels) = pixels {
            self.texture_uploads.insert(id, pixels.len());
        }
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.texture_formats.remove(&texture);
        self.destroyed_textures.push(texture);
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.texture_binds.push((unit, texture));
    }

    fn create_framebuffer(&mut self) -> Result<FramebufferId> {
        Ok(FramebufferId(self.fresh()))
    }

    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        self.framebuffer_color.insert(framebuffer, texture);
    }

    fn attach_depth(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        self.framebuffer_depth.insert(framebuffer, texture);
    }

    fn framebuffer_status(&mut self, framebuffer: FramebufferId) -> FramebufferStatus {
        let rejected = self
            .framebuffer_color
            .get(&framebuffer)
            .and_then(|tex| self.texture_formats.get(tex))
            .is_some_and(|format| self.reject_color_formats.contains(format));
        if rejected {
            FramebufferStatus::IncompleteAttachment
        } else {
            FramebufferStatus::Complete
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.framebuffer_binds.push(framebuffer);
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffer_color.remove(&framebuffer);
        self.framebuffer_depth.remove(&framebuffer);
        self.destroyed_framebuffers.push(framebuffer);
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.capability_log.push((capability, enabled));
    }

    fn set_depth_mask(&mut self, enabled: bool) {
        self.depth_mask_log.push(enabled);
    }

    fn set_color_mask(&mut self, enabled: bool) {
        self.color_mask_log.push(enabled);
    }

    fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.blend_log.push((src, dst));
    }

    fn set_cull_face(&mut self, mode: CullMode) {
        self.cull_log.push(mode);
    }

    fn viewport(&mut self, width: u32, height: u32) {
        self.viewport_log.push((width, height));
    }

    fn clear(&mut self, color: bool, depth: bool) {
        self.clear_log.push((color, depth));
    }

    fn draw_indexed(
        &mut self,
        mode: PrimitiveMode,
        _vertex_buffer: BufferId,
        _index_buffer: BufferId,
        _attributes: &[VertexAttribute],
        first: usize,
        count: usize,
    ) {
        self.draws.push(DrawCall {
            mode,
            indexed: true,
            first,
            count,
        });
    }

    fn draw_arrays(
        &mut self,
        mode: PrimitiveMode,
        _vertex_buffer: BufferId,
        _attributes: &[VertexAttribute],
        first: usize,
        count: usize,
    ) {
        self.draws.push(DrawCall {
            mode,
            indexed: false,
            first,
            count,
        });
    }
}

struct PendingFetch {
    name: String,
    url: String,
    reply: CompletionSender,
}

/// Asset source the test drives by hand: every fetch parks until the test
/// delivers or fails it, in whatever order the test chooses.
#[derive(Clone, Default)]
pub struct ManualSource {
    pending: Rc<RefCell<Vec<PendingFetch>>>,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_names(&self) -> Vec<String> {
        self.pending.borrow().iter().map(|p| p.name.clone()).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.borrow().iter().any(|p| p.name == name)
    }

    fn take(&self, name: &str) -> Option<PendingFetch> {
        let mut pending = self.pending.borrow_mut();
        let index = pending.iter().position(|p| p.name == name)?;
        Some(pending.remove(index))
    }

    /// Complete the named fetch with the given bytes. Panics if it was never
    /// requested; a test delivering an unrequested asset is broken.
    pub fn deliver(&self, name: &str, bytes: &[u8]) {
        let fetch = self
            .take(name)
            .unwrap_or_else(|| panic!("no pending fetch named {}", name));
        let _ = fetch.reply.unbounded_send(FetchCompletion {
            name: fetch.name,
            result: Ok(bytes.to_vec()),
        });
    }

    /// Complete the named fetch with an error.
    pub fn fail(&self, name: &str) {
        let fetch = self
            .take(name)
            .unwrap_or_else(|| panic!("no pending fetch named {}", name));
        let url = fetch.url.clone();
        let _ = fetch.reply.unbounded_send(FetchCompletion {
            name: fetch.name,
            result: Err(anyhow::anyhow!("fetch of {} failed", url)),
        });
    }
}

impl AssetSource for ManualSource {
    fn fetch(&mut self, name: &str, url: &str, reply: CompletionSender) {
        self.pending.borrow_mut().push(PendingFetch {
            name: name.to_string(),
            url: url.to_string(),
            reply,
        });
    }
}
