//! Scene ownership and orchestration.
//!
//! The [`Scenegraph`] owns nodes, meshes, materials, render configs, lights,
//! the camera and the FBO registry. It drives asset loading through the
//! [`AssetLoader`], dispatches completed text assets to the SCN/OBJ/MTL
//! grammar handlers, and walks the node hierarchy at render time.
//!
//! Nodes reference their parent by name, not by ownership, so the hierarchy
//! is a directed graph keyed by `(scene, name)`. Transform propagation runs
//! as an iterative traversal with a visited set: a cycle in the parent
//! references is a caller error and is rejected with a warning instead of
//! looping forever.

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::Result;
use cgmath::{Deg, InnerSpace, Matrix4, SquareMatrix, Vector3};
use log::{debug, warn};

use crate::{
    context::RenderContext,
    data_structures::{
        material::{self, MaterialStore},
        mesh::IndexedGeometryMesh,
    },
    device::{GpuDevice, PrimitiveMode, TextureDesc, TextureFormat},
    fbo::FboSystem,
    parse,
    render_config::RenderConfig,
    resources::{AssetKind, AssetLoader, AssetPayload, AssetSource},
};

/// Texture unit reserved for the environment texture.
const ENV_UNIT: u32 = 7;

/// One node of the scene hierarchy.
///
/// `pretransform` carries the inherited parent world matrix and is rewritten
/// by transform propagation; `posttransform` is reserved for post-hoc
/// adjustment by the host.
#[derive(Clone, Debug)]
pub struct ScenegraphNode {
    pub name: String,
    pub scene_name: String,
    /// Parent referenced by name within the same scene; never owned.
    pub parent: Option<String>,
    /// Mesh this node draws, referenced by name.
    pub geometry_group: Option<String>,
    pub local_transform: Matrix4<f32>,
    pub pretransform: Matrix4<f32>,
    pub posttransform: Matrix4<f32>,
}

impl ScenegraphNode {
    pub fn new(scene_name: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            scene_name: scene_name.to_string(),
            parent: None,
            geometry_group: None,
            local_transform: Matrix4::identity(),
            pretransform: Matrix4::identity(),
            posttransform: Matrix4::identity(),
        }
    }

    /// Fully composed transform: pretransform, then local, then post.
    pub fn world_matrix(&self) -> Matrix4<f32> {
        self.pretransform * self.local_transform * self.posttransform
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub position: Vector3<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            position: Vector3::new(0.0, 0.0, 0.0),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Light {
    pub position: Vector3<f32>,
    pub color: Vector3<f32>,
}

#[derive(Default)]
struct PendingShaders {
    vertex: Option<String>,
    fragment: Option<String>,
}

/// Owner and orchestrator of the whole drawable scene.
pub struct Scenegraph {
    loader: AssetLoader,
    nodes: HashMap<(String, String), ScenegraphNode>,
    meshes: HashMap<String, IndexedGeometryMesh>,
    materials: MaterialStore,
    configs: HashMap<String, RenderConfig>,
    pub fbos: FboSystem,
    ctx: RenderContext,
    pub camera: Camera,
    pub lights: Vec<Light>,
    texts: HashMap<String, String>,
    pending_shaders: HashMap<String, PendingShaders>,
    env_texture: Option<String>,
    quad: Option<IndexedGeometryMesh>,
}

impl Scenegraph {
    pub fn new(source: Box<dyn AssetSource>, width: u32, height: u32) -> Self {
        Self {
            loader: AssetLoader::new(source),
            nodes: HashMap::new(),
            meshes: HashMap::new(),
            materials: MaterialStore::default(),
            configs: HashMap::new(),
            fbos: FboSystem::new(),
            ctx: RenderContext::new(width, height),
            camera: Camera::default(),
            lights: Vec::new(),
            texts: HashMap::new(),
            pending_shaders: HashMap::new(),
            env_texture: None,
            quad: None,
        }
    }

    /// Request an asset by URL, classified by extension. Requesting the same
    /// resolved name twice is a no-op.
    pub fn load(&mut self, url: &str) {
        let kind = AssetKind::from_url(url);
        self.loader.load(url, url, kind, url);
    }

    fn load_tagged(&mut self, url: &str, kind: AssetKind, tag: &str) {
        self.loader.load(url, url, kind, tag);
    }

    pub fn was_requested(&self, name: &str) -> bool {
        self.loader.was_requested(name)
    }

    /// The scenegraph is loaded only when every asset kind reports loaded.
    pub fn loaded(&self) -> bool {
        AssetKind::ALL.iter().all(|&kind| self.loader.loaded(kind))
    }

    pub fn failed(&self) -> bool {
        AssetKind::ALL.iter().any(|&kind| self.loader.failed(kind))
    }

    pub fn percent_loaded(&self, kind: AssetKind) -> f32 {
        self.loader.percent_loaded(kind)
    }

    /// Drain completed fetches and run the matching grammar handler on each.
    ///
    /// Completions arrive in no particular order; a scene may be processed
    /// before or after the geometry it references, so every handler only
    /// creates or fills structures and never assumes its references resolved.
    pub fn update(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        for asset in self.loader.poll() {
            let Some(payload) = asset.payload else {
                continue;
            };
            match asset.kind {
                AssetKind::Scene => {
                    if let AssetPayload::Text(text) = payload {
                        self.process_scene(&asset.name, &text);
                    }
                }
                AssetKind::Geometry => {
                    if let AssetPayload::Text(text) = payload {
                        self.process_geometry(&asset.name, &text);
                    }
                }
                AssetKind::Material => {
                    if let AssetPayload::Text(text) = payload {
                        self.process_material(&asset.name, &text);
                    }
                }
                AssetKind::Image => {
                    if let AssetPayload::Image {
                        width,
                        height,
                        rgba,
                    } = payload
                    {
                        let texture = device.create_texture(
                            &TextureDesc {
                                width,
                                height,
                                format: TextureFormat::Rgba8,
                            },
                            Some(&rgba),
                        )?;
                        self.materials.textures.insert(asset.name.clone(), texture);
                    }
                }
                AssetKind::Shader => {
                    if let AssetPayload::Text(text) = payload {
                        self.process_shader(device, &asset.tag, text);
                    }
                }
                AssetKind::Text => {
                    if let AssetPayload::Text(text) = payload {
                        self.texts.insert(asset.name.clone(), text);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(String::as_str)
    }

    pub fn node(&self, scene: &str, name: &str) -> Option<&ScenegraphNode> {
        self.nodes.get(&(scene.to_string(), name.to_string()))
    }

    pub fn node_mut(&mut self, scene: &str, name: &str) -> Option<&mut ScenegraphNode> {
        self.nodes.get_mut(&(scene.to_string(), name.to_string()))
    }

    pub fn add_node(&mut self, node: ScenegraphNode) {
        self.nodes
            .insert((node.scene_name.clone(), node.name.clone()), node);
    }

    pub fn mesh(&self, name: &str) -> Option<&IndexedGeometryMesh> {
        self.meshes.get(name)
    }

    pub fn mesh_mut(&mut self, name: &str) -> Option<&mut IndexedGeometryMesh> {
        self.meshes.get_mut(name)
    }

    pub fn materials(&self) -> &MaterialStore {
        &self.materials
    }

    pub fn config(&self, name: &str) -> Option<&RenderConfig> {
        self.configs.get(name)
    }

    pub fn config_mut(&mut self, name: &str) -> Option<&mut RenderConfig> {
        self.configs.get_mut(name)
    }

    pub fn add_config(&mut self, config: RenderConfig) {
        self.configs.insert(config.name().to_string(), config);
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    /// Resize the viewport and let auto-resizing FBOs follow.
    pub fn resize(&mut self, device: &mut dyn GpuDevice, width: u32, height: u32) -> Result<()> {
        self.ctx.set_viewport(width, height);
        self.fbos.autoresize(device, width, height)
    }

    /// Rewrite the pretransform of every descendant of `(scene, name)` with
    /// its ancestor's world matrix.
    ///
    /// Iterative breadth-first walk over the parent-by-name graph. A node
    /// reached twice means the parent references form a cycle; the repeat is
    /// rejected with a warning.
    pub fn update_child_transforms(&mut self, scene: &str, name: &str) {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(name.to_string());
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(name.to_string());

        while let Some(current) = queue.pop_front() {
            let Some(node) = self.nodes.get(&(scene.to_string(), current.clone())) else {
                continue;
            };
            let world = node.world_matrix();
            let children: Vec<String> = self
                .nodes
                .values()
                .filter(|n| n.scene_name == scene && n.parent.as_deref() == Some(&current))
                .map(|n| n.name.clone())
                .collect();
            for child in children {
                if !visited.insert(child.clone()) {
                    warn!(
                        "cycle in scene {} parent references at node {}, skipping",
                        scene, child
                    );
                    continue;
                }
                if let Some(n) = self.nodes.get_mut(&(scene.to_string(), child.clone())) {
                    n.pretransform = world;
                }
                queue.push_back(child);
            }
        }
    }

    /// Activate a material on a config: see [`MaterialStore::apply`].
    pub fn usemtl(
        &mut self,
        device: &mut dyn GpuDevice,
        config_name: &str,
        library: &str,
        name: &str,
    ) {
        let Some(config) = self.configs.get_mut(config_name) else {
            warn!("usemtl on unknown render config {}", config_name);
            return;
        };
        self.materials.apply(device, config, library, name);
    }

    /// Render every node (optionally filtered by scene name) through the
    /// named render config.
    pub fn render_scene(
        &mut self,
        device: &mut dyn GpuDevice,
        config_name: &str,
        scene_filter: Option<&str>,
    ) -> Result<()> {
        let Some(config) = self.configs.get_mut(config_name) else {
            warn!("render_scene: unknown render config {}", config_name);
            return Ok(());
        };
        if !config.usable(&self.fbos) {
            debug!("render_scene: config {} not usable yet", config_name);
            return Ok(());
        }
        config.apply(device, &mut self.ctx, &self.materials.textures, &mut self.fbos);

        config.uniform_matrix4f(device, "viewMatrix", &self.camera.view);
        config.uniform_matrix4f(device, "projectionMatrix", &self.camera.projection);
        let p = self.camera.position;
        config.uniform3f(device, "cameraPosition", p.x, p.y, p.z);
        if let Some(light) = self.lights.first() {
            let lp = light.position;
            config.uniform3f(device, "lightPosition", lp.x, lp.y, lp.z);
            let lc = light.color;
            config.uniform3f(device, "lightColor", lc.x, lc.y, lc.z);
        }
        if let Some(env) = &self.env_texture {
            if let Some(&id) = self.materials.textures.get(env) {
                device.bind_texture(ENV_UNIT, Some(id));
                config.uniform1i(device, "enviroCube", ENV_UNIT as i32);
            }
        }

        for node in self.nodes.values() {
            if scene_filter.is_some_and(|s| s != node.scene_name) {
                continue;
            }
            let Some(group) = &node.geometry_group else {
                continue;
            };
            let Some(mesh) = self.meshes.get_mut(group) else {
                debug!("node {} references missing mesh {}", node.name, group);
                continue;
            };
            config.uniform_matrix4f(device, "worldMatrix", &node.world_matrix());
            if config.render_edges {
                mesh.render_edges(device, config)?;
            } else {
                mesh.render(device, config, &self.materials)?;
            }
        }

        config.restore(device, &mut self.ctx, &mut self.fbos);
        Ok(())
    }

    /// Full-screen composition pass: draws a unit quad through the named
    /// config, bypassing the node walk.
    pub fn render_deferred(&mut self, device: &mut dyn GpuDevice, config_name: &str) -> Result<()> {
        if self.quad.is_none() {
            self.quad = Some(fullscreen_quad());
        }
        let Some(config) = self.configs.get_mut(config_name) else {
            warn!("render_deferred: unknown render config {}", config_name);
            return Ok(());
        };
        if !config.usable(&self.fbos) {
            debug!("render_deferred: config {} not usable yet", config_name);
            return Ok(());
        }
        config.apply(device, &mut self.ctx, &self.materials.textures, &mut self.fbos);
        if let Some(quad) = self.quad.as_mut() {
            quad.render(device, config, &self.materials)?;
        }
        config.restore(device, &mut self.ctx, &mut self.fbos);
        Ok(())
    }

    /// Process the SCN scene grammar.
    ///
    /// A transform accumulator carries `loadIdentity`/`translate`/`rotate`/
    /// `scale`/`transform` state onto subsequently declared nodes. Unknown
    /// keywords are ignored so newer scene files still load.
    fn process_scene(&mut self, scene_url: &str, text: &str) {
        let scene = stem(scene_url).to_string();
        let mut transform = Matrix4::identity();

        for tokens in parse::parse(text) {
            match tokens[0].as_str() {
                "enviroCube" => {
                    if let Some(url) = tokens.get(1) {
                        self.env_texture = Some(url.clone());
                        let url = url.clone();
                        self.load_tagged(&url, AssetKind::Image, "");
                    }
                }
                "transform" => match parse::parse_matrix(&tokens) {
                    Some(matrix) => transform = matrix,
                    None => warn!("{}: transform needs 16 floats, ignoring", scene),
                },
                "loadIdentity" => transform = Matrix4::identity(),
                "translate" => {
                    let v = parse::parse_vector3(&tokens);
                    transform = transform * Matrix4::from_translation(v);
                }
                "rotate" => {
                    let v = parse::parse_vector4(&tokens);
                    let axis = Vector3::new(v.y, v.z, v.w);
                    if axis.magnitude2() > 0.0 {
                        transform = transform * Matrix4::from_axis_angle(axis.normalize(), Deg(v.x));
                    }
                }
                "scale" => {
                    let v = parse::parse_vector3(&tokens);
                    transform = transform * Matrix4::from_nonuniform_scale(v.x, v.y, v.z);
                }
                "geometryGroup" => self.scene_geometry_group(&scene, &tokens, transform),
                "node" => {
                    let Some(name) = tokens.get(1) else {
                        warn!("{}: node without a name, ignoring", scene);
                        continue;
                    };
                    let mut node = ScenegraphNode::new(&scene, name);
                    node.parent = tokens.get(2).cloned();
                    node.local_transform = transform;
                    self.add_node(node);
                }
                "renderconfig" => {
                    let (Some(name), Some(vert), Some(frag)) =
                        (tokens.get(1), tokens.get(2), tokens.get(3))
                    else {
                        warn!("{}: renderconfig needs name and two urls, ignoring", scene);
                        continue;
                    };
                    self.configs
                        .insert(name.clone(), RenderConfig::new(name));
                    self.pending_shaders
                        .entry(name.clone())
                        .or_default();
                    let vert_tag = format!("{}|vertex", name);
                    let frag_tag = format!("{}|fragment", name);
                    let (vert, frag) = (vert.clone(), frag.clone());
                    self.load_tagged(&vert, AssetKind::Shader, &vert_tag);
                    self.load_tagged(&frag, AssetKind::Shader, &frag_tag);
                }
                other => debug!("{}: unknown scn keyword {}, ignoring", scene, other),
            }
        }

        // Propagate initial transforms down from every root of this scene.
        let roots: Vec<String> = self
            .nodes
            .values()
            .filter(|n| n.scene_name == scene && n.parent.is_none())
            .map(|n| n.name.clone())
            .collect();
        for root in roots {
            self.update_child_transforms(&scene, &root);
        }
    }

    /// `geometryGroup [name] [parent] <url>`: declare a node drawing a mesh
    /// and kick off the geometry load.
    fn scene_geometry_group(&mut self, scene: &str, tokens: &[String], transform: Matrix4<f32>) {
        let args = &tokens[1..];
        let (name, parent, url) = match args {
            [url] => (stem(url).to_string(), None, url.clone()),
            [name, url] => (name.clone(), None, url.clone()),
            [name, parent, url, ..] => (name.clone(), Some(parent.clone()), url.clone()),
            _ => {
                warn!("{}: geometryGroup without a url, ignoring", scene);
                return;
            }
        };
        self.meshes
            .entry(url.clone())
            .or_insert_with(|| IndexedGeometryMesh::new(&url));
        let mut node = ScenegraphNode::new(scene, &name);
        node.parent = parent;
        node.geometry_group = Some(url.clone());
        node.local_transform = transform;
        self.add_node(node);
        self.load_tagged(&url, AssetKind::Geometry, &url);
    }

    /// Process an OBJ payload into its mesh and load any referenced material
    /// libraries.
    fn process_geometry(&mut self, url: &str, text: &str) {
        let mesh = self
            .meshes
            .entry(url.to_string())
            .or_insert_with(|| IndexedGeometryMesh::new(url));
        let libraries = mesh.ingest_obj(text);
        for library in libraries {
            self.load_tagged(&library, AssetKind::Material, "");
        }
    }

    /// Process an MTL payload and load the textures it references.
    fn process_material(&mut self, library_url: &str, text: &str) {
        let (materials, textures) = material::parse_mtl(text);
        for (name, material) in materials {
            self.materials.insert(library_url, &name, material);
        }
        for url in textures {
            self.load_tagged(&url, AssetKind::Image, "");
        }
    }

    /// Stash one shader stage; compile the config once both stages arrived.
    fn process_shader(&mut self, device: &mut dyn GpuDevice, tag: &str, source: String) {
        let Some((config_name, stage)) = tag.rsplit_once('|') else {
            debug!("shader completion with unroutable tag {}, ignoring", tag);
            return;
        };
        let pending = self.pending_shaders.entry(config_name.to_string()).or_default();
        match stage {
            "vertex" => pending.vertex = Some(source),
            "fragment" => pending.fragment = Some(source),
            _ => {
                warn!("shader tag {} names unknown stage {}", tag, stage);
                return;
            }
        }
        let (Some(vertex), Some(fragment)) = (&pending.vertex, &pending.fragment) else {
            return;
        };
        let (vertex, fragment) = (vertex.clone(), fragment.clone());
        match self.configs.get_mut(config_name) {
            Some(config) => {
                config.compile(device, &vertex, &fragment);
            }
            None => warn!("shaders arrived for unknown render config {}", config_name),
        }
    }
}

/// File stem of a URL: last path segment without its extension.
fn stem(url: &str) -> &str {
    let name = url.rsplit('/').next().unwrap_or(url);
    name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name)
}

/// Unit quad for deferred composition passes.
fn fullscreen_quad() -> IndexedGeometryMesh {
    let mut quad = IndexedGeometryMesh::new("fullscreen_quad");
    quad.begin(PrimitiveMode::Triangles);
    let corners = [
        ([-1.0f32, -1.0, 0.0], [0.0f32, 0.0]),
        ([1.0, -1.0, 0.0], [1.0, 0.0]),
        ([1.0, 1.0, 0.0], [1.0, 1.0]),
        ([-1.0, 1.0, 0.0], [0.0, 1.0]),
    ];
    for (position, texcoord) in corners {
        quad.normal(0.0, 0.0, 1.0);
        quad.texcoord(texcoord[0], texcoord[1], 0.0);
        quad.vertex(position[0], position[1], position[2]);
    }
    for index in [0i64, 1, 2, 0, 2, 3] {
        quad.add_index(index);
    }
    quad
}
