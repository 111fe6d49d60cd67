//! prism-ngin
//!
//! A small real-time rendering engine core: a scenegraph that loads its
//! scene, geometry, material, shader and image assets asynchronously,
//! parses the line-oriented SCN/OBJ/MTL text formats, and manages the GPU
//! resources those assets become. Rendering goes through the [`device`]
//! trait, so the engine itself never touches a graphics API directly.
//!
//! High-level modules
//! - `context`: explicit per-frame render state (active config, write target)
//! - `data_structures`: engine data models (meshes, edge adjacency, materials)
//! - `device`: the GPU backend trait and its handle/value types
//! - `fbo`: named off-screen render targets with format negotiation
//! - `parse`: the shared line/token grammar the text formats build on
//! - `render_config`: compiled shader pipelines plus fixed-function state
//! - `resources`: asynchronous deduplicated asset loading
//! - `scenegraph`: the orchestrator tying all of the above together
//!

pub mod context;
pub mod data_structures;
pub mod device;
pub mod fbo;
pub mod parse;
pub mod render_config;
pub mod resources;
pub mod scenegraph;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use context::RenderContext;
pub use fbo::FboSystem;
pub use render_config::RenderConfig;
pub use scenegraph::Scenegraph;
