//! Shader pipeline configuration.
//!
//! A [`RenderConfig`] is one compiled and linked shader program together with
//! the fixed-function state and texture-unit bindings that belong to it.
//! `compile` owns the full stage-compile / link / uniform-reflection cycle;
//! `apply`/`restore` bracket a render pass, including handing off to the FBO
//! system for read/write target binding.
//!
//! Uniform setters silently skip names the active program does not declare.
//! Shader variants legitimately omit unused uniforms, so a missing name is
//! not an error; it is logged once per config to keep noise down.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::{
    context::RenderContext,
    device::{
        BlendFactor, Capability, CullMode, GpuDevice, ProgramId, ShaderStage, TextureId,
        UniformLocation, UniformValue,
    },
    fbo::FboSystem,
};

/// One texture-name-to-sampler-uniform binding.
#[derive(Clone, Debug)]
struct TextureBinding {
    uniform: String,
    texture: String,
    unit: u32,
}

/// A compiled shader pipeline plus its fixed-function state.
pub struct RenderConfig {
    name: String,
    program: Option<ProgramId>,
    vertex_ok: bool,
    fragment_ok: bool,
    linked: bool,
    vertex_log: String,
    fragment_log: String,
    link_log: String,
    uniforms: HashMap<String, UniformLocation>,
    reported_missing: HashSet<String>,

    pub depth_test: bool,
    pub depth_mask: bool,
    pub blend: Option<(BlendFactor, BlendFactor)>,
    pub cull: Option<CullMode>,
    pub stencil_test: bool,
    /// Draw the mesh's derived edge list instead of filled surfaces.
    pub render_edges: bool,

    bindings: Vec<TextureBinding>,
    /// Last unit each sampler uniform was bound to, for `unit < 0` rebinds.
    remembered_units: HashMap<String, u32>,

    write_target: Option<String>,
    read_targets: Vec<String>,
    pub clear_write_target: bool,
    /// Depth-only pass: color writes are masked off while the target is bound.
    pub depth_only: bool,
}

impl RenderConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            program: None,
            vertex_ok: false,
            fragment_ok: false,
            linked: false,
            vertex_log: String::new(),
            fragment_log: String::new(),
            link_log: String::new(),
            uniforms: HashMap::new(),
            reported_missing: HashSet::new(),
            depth_test: true,
            depth_mask: true,
            blend: None,
            cull: None,
            stencil_test: false,
            render_edges: false,
            bindings: Vec::new(),
            remembered_units: HashMap::new(),
            write_target: None,
            read_targets: Vec::new(),
            clear_write_target: true,
            depth_only: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compile both stages, link on dual success and rebuild the uniform
    /// cache. Returns whether the config ended up linked.
    ///
    /// Every call fully replaces the previous program and uniform cache, so a
    /// stale location is never reused after a recompile.
    pub fn compile(&mut self, device: &mut dyn GpuDevice, vertex: &str, fragment: &str) -> bool {
        if let Some(old) = self.program.take() {
            device.destroy_program(old);
        }
        self.uniforms.clear();
        self.reported_missing.clear();
        self.linked = false;

        let vs = device.compile_shader(ShaderStage::Vertex, vertex);
        self.vertex_ok = vs.ok;
        self.vertex_log = vs.info_log;
        let fs = device.compile_shader(ShaderStage::Fragment, fragment);
        self.fragment_ok = fs.ok;
        self.fragment_log = fs.info_log;

        if !self.vertex_ok || !self.fragment_ok {
            if !self.vertex_ok {
                warn!("{}: vertex stage failed: {}", self.name, self.vertex_log);
            }
            if !self.fragment_ok {
                warn!("{}: fragment stage failed: {}", self.name, self.fragment_log);
            }
            device.destroy_shader(vs.shader);
            device.destroy_shader(fs.shader);
            return false;
        }

        let link = device.link_program(vs.shader, fs.shader);
        self.link_log = link.info_log;
        device.destroy_shader(vs.shader);
        device.destroy_shader(fs.shader);
        if !link.ok {
            warn!("{}: link failed: {}", self.name, self.link_log);
            device.destroy_program(link.program);
            return false;
        }

        self.linked = true;
        self.program = Some(link.program);
        for (name, location) in device.active_uniforms(link.program) {
            self.uniforms.insert(name, location);
        }
        true
    }

    pub fn compiled(&self) -> bool {
        self.vertex_ok && self.fragment_ok
    }

    pub fn linked(&self) -> bool {
        self.linked
    }

    pub fn info_logs(&self) -> (&str, &str, &str) {
        (&self.vertex_log, &self.fragment_log, &self.link_log)
    }

    /// A config is usable when it linked and, if it writes to an FBO, that
    /// FBO is complete.
    pub fn usable(&self, fbos: &FboSystem) -> bool {
        if !self.compiled() || !self.linked {
            return false;
        }
        match &self.write_target {
            Some(target) => fbos.is_complete(target),
            None => true,
        }
    }

    /// Register a texture for a sampler uniform.
    ///
    /// A negative `unit` reuses the unit this uniform was last bound to, so
    /// callers can rebind the same slot without tracking unit numbers.
    pub fn bind_texture_uniform(&mut self, uniform: &str, texture: &str, unit: i32) {
        let unit = if unit < 0 {
            match self.remembered_units.get(uniform) {
                Some(&u) => u,
                None => {
                    warn!(
                        "{}: no remembered unit for sampler {}, defaulting to 0",
                        self.name, uniform
                    );
                    0
                }
            }
        } else {
            let u = unit as u32;
            self.remembered_units.insert(uniform.to_string(), u);
            u
        };
        // Re-binding the same uniform replaces the previous registration.
        self.bindings.retain(|b| b.uniform != uniform);
        self.bindings.push(TextureBinding {
            uniform: uniform.to_string(),
            texture: texture.to_string(),
            unit,
        });
    }

    pub fn set_write_target(&mut self, name: Option<&str>) {
        self.write_target = name.map(str::to_string);
    }

    pub fn write_target(&self) -> Option<&str> {
        self.write_target.as_deref()
    }

    pub fn add_read_target(&mut self, name: &str) {
        if !self.read_targets.iter().any(|t| t == name) {
            self.read_targets.push(name.to_string());
        }
    }

    pub fn read_targets(&self) -> &[String] {
        &self.read_targets
    }

    /// First texture unit past the registered sampler bindings, where the FBO
    /// system starts binding read targets.
    fn first_free_unit(&self) -> u32 {
        self.bindings.iter().map(|b| b.unit + 1).max().unwrap_or(0)
    }

    /// Activate the program, apply fixed-function state, bind registered
    /// textures and hand read/write targets to the FBO system.
    pub fn apply(
        &mut self,
        device: &mut dyn GpuDevice,
        ctx: &mut RenderContext,
        textures: &HashMap<String, TextureId>,
        fbos: &mut FboSystem,
    ) {
        ctx.enter_config(&self.name);
        device.use_program(self.program);

        device.set_capability(Capability::DepthTest, self.depth_test);
        device.set_depth_mask(self.depth_mask);
        device.set_capability(Capability::Blend, self.blend.is_some());
        if let Some((src, dst)) = self.blend {
            device.set_blend_func(src, dst);
        }
        device.set_capability(Capability::CullFace, self.cull.is_some());
        if let Some(mode) = self.cull {
            device.set_cull_face(mode);
        }
        device.set_capability(Capability::StencilTest, self.stencil_test);

        for binding in self.bindings.clone() {
            match textures.get(&binding.texture) {
                Some(&id) => {
                    device.bind_texture(binding.unit, Some(id));
                    self.uniform1i(device, &binding.uniform, binding.unit as i32);
                }
                None => debug!(
                    "{}: texture {} for sampler {} not loaded yet",
                    self.name, binding.texture, binding.uniform
                ),
            }
        }

        let start_unit = self.first_free_unit();
        fbos.configure(device, ctx, self, start_unit);
    }

    /// Exact inverse of [`apply`](Self::apply): release targets, unbind the
    /// units this config bound and reset fixed-function toggles.
    pub fn restore(
        &mut self,
        device: &mut dyn GpuDevice,
        ctx: &mut RenderContext,
        fbos: &mut FboSystem,
    ) {
        fbos.restore(device, ctx);
        for binding in &self.bindings {
            device.bind_texture(binding.unit, None);
        }
        device.set_capability(Capability::DepthTest, false);
        device.set_depth_mask(true);
        device.set_capability(Capability::Blend, false);
        device.set_capability(Capability::CullFace, false);
        device.set_capability(Capability::StencilTest, false);
        device.use_program(None);
        ctx.exit_config(&self.name);
    }

    fn location(&mut self, name: &str) -> Option<UniformLocation> {
        match self.uniforms.get(name) {
            Some(&loc) => Some(loc),
            None => {
                if self.reported_missing.insert(name.to_string()) {
                    debug!("{}: uniform {} not active, ignoring", self.name, name);
                }
                None
            }
        }
    }

    fn set(&mut self, device: &mut dyn GpuDevice, name: &str, value: UniformValue) {
        if let Some(location) = self.location(name) {
            device.set_uniform(location, value);
        }
    }

    pub fn uniform1f(&mut self, device: &mut dyn GpuDevice, name: &str, x: f32) {
        self.set(device, name, UniformValue::Float(x));
    }

    pub fn uniform2f(&mut self, device: &mut dyn GpuDevice, name: &str, x: f32, y: f32) {
        self.set(device, name, UniformValue::Vec2([x, y]));
    }

    pub fn uniform3f(&mut self, device: &mut dyn GpuDevice, name: &str, x: f32, y: f32, z: f32) {
        self.set(device, name, UniformValue::Vec3([x, y, z]));
    }

    pub fn uniform4f(
        &mut self,
        device: &mut dyn GpuDevice,
        name: &str,
        x: f32,
        y: f32,
        z: f32,
        w: f32,
    ) {
        self.set(device, name, UniformValue::Vec4([x, y, z, w]));
    }

    pub fn uniform_matrix4f(
        &mut self,
        device: &mut dyn GpuDevice,
        name: &str,
        matrix: &cgmath::Matrix4<f32>,
    ) {
        self.set(device, name, UniformValue::Mat4((*matrix).into()));
    }

    pub fn uniform1i(&mut self, device: &mut dyn GpuDevice, name: &str, x: i32) {
        self.set(device, name, UniformValue::Int(x));
    }
}
