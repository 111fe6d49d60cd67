//! Render pass context: the single-slot "current" state.
//!
//! Exactly one render config and one write framebuffer may be active at a
//! time. Instead of hidden globals, the active pair lives in an explicit
//! [`RenderContext`] passed through the render call chain. Nesting a second
//! `use()`/`configure()` without the matching `restore()` is a caller error
//! and is caught here with a warning (and a debug assertion).

use log::warn;

/// Explicit per-pass state threaded through `use()`/`configure()`/`restore()`.
#[derive(Debug, Default)]
pub struct RenderContext {
    current_config: Option<String>,
    current_write_target: Option<String>,
    viewport: (u32, u32),
}

impl RenderContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            current_config: None,
            current_write_target: None,
            viewport: (width, height),
        }
    }

    /// Record `name` as the active render config.
    pub(crate) fn enter_config(&mut self, name: &str) {
        if let Some(active) = &self.current_config {
            warn!(
                "render config {} activated while {} is still active; missing restore()?",
                name, active
            );
            debug_assert!(false, "nested render config activation");
        }
        self.current_config = Some(name.to_string());
    }

    pub(crate) fn exit_config(&mut self, name: &str) {
        if self.current_config.as_deref() != Some(name) {
            warn!("restore() for render config {} which is not active", name);
        }
        self.current_config = None;
    }

    /// Record `name` as the current FBO write target.
    pub(crate) fn enter_write_target(&mut self, name: &str) {
        if let Some(active) = &self.current_write_target {
            warn!(
                "write target {} bound while {} is still bound; missing restore()?",
                name, active
            );
            debug_assert!(false, "nested write target binding");
        }
        self.current_write_target = Some(name.to_string());
    }

    pub(crate) fn take_write_target(&mut self) -> Option<String> {
        self.current_write_target.take()
    }

    pub fn current_config(&self) -> Option<&str> {
        self.current_config.as_deref()
    }

    pub fn current_write_target(&self) -> Option<&str> {
        self.current_write_target.as_deref()
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }
}
