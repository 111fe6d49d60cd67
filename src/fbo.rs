//! Named off-screen render targets.
//!
//! Each FBO owns its attachment textures and framebuffer handle. Creation
//! negotiates the color format: a floating-point request that comes back
//! incomplete falls back once to fixed-point `Rgba8` and retries. That is the
//! only automatic recovery; any other incompleteness leaves the FBO unusable
//! until it is explicitly remade.
//!
//! `configure` binds a render config's write target and read targets;
//! `restore` is the matching inverse. Auto-resizing FBOs follow the viewport
//! through [`FboSystem::autoresize`].

use std::collections::HashMap;

use anyhow::Result;
use log::{debug, warn};

use crate::{
    context::RenderContext,
    device::{FramebufferId, FramebufferStatus, GpuDevice, TextureDesc, TextureFormat, TextureId},
    render_config::RenderConfig,
};

/// One off-screen target with optional color/depth attachments.
pub struct Fbo {
    name: String,
    has_color: bool,
    has_depth: bool,
    width: u32,
    height: u32,
    color_format: TextureFormat,
    depth_format: TextureFormat,
    complete: bool,
    framebuffer: Option<FramebufferId>,
    color_texture: Option<TextureId>,
    depth_texture: Option<TextureId>,
    pub auto_resize: bool,
    /// Units the color/depth textures are currently bound at for read-back.
    bound_units: Option<(u32, u32)>,
}

impl Fbo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color_format(&self) -> TextureFormat {
        self.color_format
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn destroy_attachments(&mut self, device: &mut dyn GpuDevice) {
        if let Some(tex) = self.color_texture.take() {
            device.destroy_texture(tex);
        }
        if let Some(tex) = self.depth_texture.take() {
            device.destroy_texture(tex);
        }
        if let Some(fb) = self.framebuffer.take() {
            device.destroy_framebuffer(fb);
        }
        self.complete = false;
    }
}

/// Registry and binding protocol for all off-screen targets.
#[derive(Default)]
pub struct FboSystem {
    fbos: HashMap<String, Fbo>,
}

impl FboSystem {
    pub fn new() -> Self {
        crate::device::validate_format_table();
        Self {
            fbos: HashMap::new(),
        }
    }

    /// Register and build a named FBO.
    ///
    /// Format hints are negotiated at creation: see [`FboSystem::make`] for
    /// the fallback rule. Returns `Err` only for device allocation failure.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        device: &mut dyn GpuDevice,
        name: &str,
        has_color: bool,
        has_depth: bool,
        width: u32,
        height: u32,
        color_format: TextureFormat,
        depth_format: TextureFormat,
    ) -> Result<()> {
        // Re-registering a name replaces the FBO; the old GPU objects must
        // not leak.
        if let Some(previous) = self.fbos.get_mut(name) {
            warn!("fbo {} already exists, replacing it", name);
            previous.destroy_attachments(device);
        }
        let fbo = Fbo {
            name: name.to_string(),
            has_color,
            has_depth,
            width: width.max(1),
            height: height.max(1),
            color_format,
            depth_format,
            complete: false,
            framebuffer: None,
            color_texture: None,
            depth_texture: None,
            auto_resize: false,
            bound_units: None,
        };
        self.fbos.insert(name.to_string(), fbo);
        self.make(device, name)
    }

    pub fn get(&self, name: &str) -> Option<&Fbo> {
        self.fbos.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Fbo> {
        self.fbos.get_mut(name)
    }

    pub fn is_complete(&self, name: &str) -> bool {
        self.fbos.get(name).is_some_and(|f| f.complete)
    }

    /// (Re)allocate an FBO's attachments and check completeness.
    ///
    /// On incompleteness with a floating-point color format, the format drops
    /// to `Rgba8` and allocation reruns once. The fallback format can never
    /// be floating-point itself, so the retry cannot recurse further. Any
    /// other incompleteness is terminal for this FBO.
    pub fn make(&mut self, device: &mut dyn GpuDevice, name: &str) -> Result<()> {
        let Some(fbo) = self.fbos.get_mut(name) else {
            warn!("make() for unknown fbo {}", name);
            return Ok(());
        };
        fbo.destroy_attachments(device);

        let framebuffer = device.create_framebuffer()?;
        fbo.framebuffer = Some(framebuffer);
        if fbo.has_color {
            let tex = device.create_texture(
                &TextureDesc {
                    width: fbo.width,
                    height: fbo.height,
                    format: fbo.color_format,
                },
                None,
            )?;
            device.attach_color(framebuffer, tex);
            fbo.color_texture = Some(tex);
        }
        if fbo.has_depth {
            let tex = device.create_texture(
                &TextureDesc {
                    width: fbo.width,
                    height: fbo.height,
                    format: fbo.depth_format,
                },
                None,
            )?;
            device.attach_depth(framebuffer, tex);
            fbo.depth_texture = Some(tex);
        }

        match device.framebuffer_status(framebuffer) {
            FramebufferStatus::Complete => {
                fbo.complete = true;
                Ok(())
            }
            status if fbo.has_color && fbo.color_format.is_float_color() => {
                let failed = fbo.color_format;
                fbo.color_format = TextureFormat::Rgba8;
                debug!(
                    "fbo {} incomplete ({:?}) with {:?}, retrying with Rgba8",
                    name, status, failed
                );
                self.make(device, name)
            }
            status => {
                warn!("fbo {} incomplete: {:?}", name, status);
                fbo.complete = false;
                Ok(())
            }
        }
    }

    /// Resize every auto-resizing FBO whose stored dimensions differ from the
    /// target. Formats are kept; only the attachment textures are recreated.
    pub fn autoresize(&mut self, device: &mut dyn GpuDevice, width: u32, height: u32) -> Result<()> {
        let stale: Vec<String> = self
            .fbos
            .values()
            .filter(|f| f.auto_resize && (f.width != width || f.height != height))
            .map(|f| f.name.clone())
            .collect();
        for name in stale {
            if let Some(fbo) = self.fbos.get_mut(&name) {
                fbo.width = width.max(1);
                fbo.height = height.max(1);
            }
            self.make(device, &name)?;
        }
        Ok(())
    }

    /// Bind a config's write target and read targets.
    ///
    /// Read targets occupy two consecutive units each, starting at
    /// `start_unit`, with `<name>Color` / `<name>Depth` sampler uniforms,
    /// a `<name>Resolution` 2-vector and an `<name>Enabled` flag. A config
    /// that itself writes to an FBO gets no read targets bound: a pass cannot
    /// sample and write the same logical resource.
    pub fn configure(
        &mut self,
        device: &mut dyn GpuDevice,
        ctx: &mut RenderContext,
        config: &mut RenderConfig,
        start_unit: u32,
    ) {
        if let Some(target) = config.write_target().map(str::to_string) {
            match self.fbos.get(&target) {
                Some(fbo) if fbo.complete => {
                    device.bind_framebuffer(fbo.framebuffer);
                    device.viewport(fbo.width, fbo.height);
                    if config.depth_only {
                        device.set_color_mask(false);
                    }
                    if config.clear_write_target {
                        device.clear(fbo.has_color && !config.depth_only, fbo.has_depth);
                    }
                    ctx.enter_write_target(&target);
                }
                Some(_) => warn!("write target {} is incomplete, skipping bind", target),
                None => warn!("write target {} does not exist", target),
            }
            // Writing passes never sample other targets.
            return;
        }

        let mut unit = start_unit;
        for target in config.read_targets().to_vec() {
            let Some(fbo) = self.fbos.get_mut(&target) else {
                warn!("read target {} does not exist", target);
                continue;
            };
            if !fbo.complete {
                debug!("read target {} not complete, skipping", target);
                continue;
            }
            device.bind_texture(unit, fbo.color_texture);
            device.bind_texture(unit + 1, fbo.depth_texture);
            fbo.bound_units = Some((unit, unit + 1));
            let (width, height) = (fbo.width as f32, fbo.height as f32);
            config.uniform1i(device, &format!("{}Color", target), unit as i32);
            config.uniform1i(device, &format!("{}Depth", target), unit as i32 + 1);
            config.uniform2f(device, &format!("{}Resolution", target), width, height);
            config.uniform1i(device, &format!("{}Enabled", target), 1);
            unit += 2;
        }
    }

    /// Undo [`configure`](Self::configure): unbind the current write target
    /// if one is set, otherwise defensively unbind read textures on every
    /// complete FBO.
    pub fn restore(&mut self, device: &mut dyn GpuDevice, ctx: &mut RenderContext) {
        if let Some(target) = ctx.take_write_target() {
            device.bind_framebuffer(None);
            device.set_color_mask(true);
            let (width, height) = ctx.viewport();
            device.viewport(width, height);
            debug!("released write target {}", target);
            return;
        }
        for fbo in self.fbos.values_mut().filter(|f| f.complete) {
            if let Some((color_unit, depth_unit)) = fbo.bound_units.take() {
                device.bind_texture(color_unit, None);
                device.bind_texture(depth_unit, None);
            }
        }
    }

    /// Destroy every GPU object this system owns.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        for fbo in self.fbos.values_mut() {
            fbo.destroy_attachments(device);
        }
        self.fbos.clear();
    }
}
