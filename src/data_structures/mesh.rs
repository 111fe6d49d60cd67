//! Indexed geometry built from an immediate-mode vertex stream.
//!
//! [`IndexedGeometryMesh`] owns an interleaved vertex array (position,
//! normal, color, texcoord: 12 floats per vertex), a 32-bit index array, an
//! ordered list of [`Surface`]s partitioning those indices by material, a
//! derived [`EdgeMesh`] and the GPU buffer handles. A dirty flag marks the
//! GPU side stale; `build` is the only upload point and is idempotent while
//! the flag is clear.
//!
//! The OBJ geometry grammar is ingested here as well, since faces are what
//! drive both the index stream and the edge-mesh derivation.

use std::collections::HashMap;

use anyhow::Result;
use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector3, Zero};
use log::{debug, warn};

use crate::{
    data_structures::{edge_mesh::EdgeMesh, material::MaterialStore},
    device::{BufferId, BufferTarget, GpuDevice, PrimitiveMode, VertexAttribute},
    parse,
    render_config::RenderConfig,
};

/// Floats per interleaved vertex: position, normal, color, texcoord.
pub const FLOATS_PER_VERTEX: usize = 12;
/// Byte stride of one interleaved vertex.
pub const VERTEX_STRIDE: u32 = (FLOATS_PER_VERTEX * 4) as u32;

/// Attribute layout of the interleaved stream: four vec3s at fixed offsets.
pub fn vertex_attributes() -> [VertexAttribute; 4] {
    [0u32, 1, 2, 3].map(|slot| VertexAttribute {
        location: slot,
        components: 3,
        offset: slot * 12,
        stride: VERTEX_STRIDE,
    })
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    /// An inverted box that any first `extend` will snap to.
    pub fn empty() -> Self {
        Self {
            min: Vector3::new(f32::MAX, f32::MAX, f32::MAX),
            max: Vector3::new(f32::MIN, f32::MIN, f32::MIN),
        }
    }

    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn extend(&mut self, point: Vector3<f32>) {
        self.min = Vector3::new(
            self.min.x.min(point.x),
            self.min.y.min(point.y),
            self.min.z.min(point.z),
        );
        self.max = Vector3::new(
            self.max.x.max(point.x),
            self.max.y.max(point.y),
            self.max.z.max(point.z),
        );
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Largest axis extent.
    pub fn max_size(&self) -> f32 {
        let s = self.size();
        s.x.max(s.y).max(s.z)
    }

    /// Overlap test: all three axis ranges must overlap.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn approx_eq(&self, other: &Aabb, epsilon: f32) -> bool {
        let d1 = self.min - other.min;
        let d2 = self.max - other.max;
        d1.magnitude() <= epsilon && d2.magnitude() <= epsilon
    }
}

/// A contiguous run of the index buffer sharing one primitive mode and one
/// material.
#[derive(Clone, Debug)]
pub struct Surface {
    pub mode: PrimitiveMode,
    /// First index of this surface within the mesh's index array.
    pub start: usize,
    pub count: usize,
    pub material_library: String,
    pub material_name: String,
    pub local_transform: Matrix4<f32>,
}

/// Per-axis placement of a rescaled mesh inside its target box when the mesh
/// shrinks on that axis: -1 flush to the target min, 0 centered, 1 flush to
/// the target max.
pub type Centering = [i32; 3];

pub struct IndexedGeometryMesh {
    name: String,
    vertices: Vec<f32>,
    indices: Vec<u32>,
    surfaces: Vec<Surface>,
    pub edge_mesh: EdgeMesh,
    bounds: Aabb,
    target_bounds: Option<Aabb>,
    centering: Centering,
    dirty: bool,
    vertex_buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,

    // Pending per-vertex attributes for the immediate-mode stream.
    pending_normal: Vector3<f32>,
    pending_color: Vector3<f32>,
    pending_texcoord: Vector3<f32>,
    // Snapshotted onto the surface opened by the next begin().
    current_material_library: String,
    current_material_name: String,
    current_transform: Matrix4<f32>,
}

impl IndexedGeometryMesh {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vertices: Vec::new(),
            indices: Vec::new(),
            surfaces: Vec::new(),
            edge_mesh: EdgeMesh::new(),
            bounds: Aabb::empty(),
            target_bounds: None,
            centering: [0, 0, 0],
            dirty: true,
            vertex_buffer: None,
            index_buffer: None,
            pending_normal: Vector3::zero(),
            pending_color: Vector3::new(1.0, 1.0, 1.0),
            pending_texcoord: Vector3::zero(),
            current_material_library: String::new(),
            current_material_name: String::new(),
            current_transform: Matrix4::identity(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / FLOATS_PER_VERTEX
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn normal(&mut self, x: f32, y: f32, z: f32) {
        self.pending_normal = Vector3::new(x, y, z);
    }

    pub fn color(&mut self, r: f32, g: f32, b: f32) {
        self.pending_color = Vector3::new(r, g, b);
    }

    pub fn texcoord(&mut self, u: f32, v: f32, w: f32) {
        self.pending_texcoord = Vector3::new(u, v, w);
    }

    /// Append a vertex with the currently pending attributes and extend the
    /// bounding box. The edge mesh is fed from face registration, not from
    /// the raw vertex stream.
    pub fn vertex(&mut self, x: f32, y: f32, z: f32) {
        let position = Vector3::new(x, y, z);
        self.vertices.extend_from_slice(&[x, y, z]);
        let n = self.pending_normal;
        self.vertices.extend_from_slice(&[n.x, n.y, n.z]);
        let c = self.pending_color;
        self.vertices.extend_from_slice(&[c.x, c.y, c.z]);
        let t = self.pending_texcoord;
        self.vertices.extend_from_slice(&[t.x, t.y, t.z]);
        self.bounds.extend(position);
        self.dirty = true;
    }

    /// Open a new surface, snapshotting the current material and local
    /// transform. An empty trailing surface is reconfigured in place rather
    /// than duplicated.
    pub fn begin(&mut self, mode: PrimitiveMode) {
        match self.surfaces.last_mut() {
            Some(last) if last.count == 0 => {
                last.mode = mode;
                last.start = self.indices.len();
                last.material_library = self.current_material_library.clone();
                last.material_name = self.current_material_name.clone();
                last.local_transform = self.current_transform;
            }
            _ => self.surfaces.push(Surface {
                mode,
                start: self.indices.len(),
                count: 0,
                material_library: self.current_material_library.clone(),
                material_name: self.current_material_name.clone(),
                local_transform: self.current_transform,
            }),
        }
    }

    /// Append an index to the open surface. Negative values are relative to
    /// the current vertex count, matching the face-parsing convention.
    pub fn add_index(&mut self, index: i64) {
        if self.surfaces.is_empty() {
            self.begin(PrimitiveMode::Triangles);
        }
        let resolved = if index < 0 {
            let count = self.vertex_count() as i64;
            (count + index) as u32
        } else {
            index as u32
        };
        self.indices.push(resolved);
        if let Some(last) = self.surfaces.last_mut() {
            last.count += 1;
        }
        self.dirty = true;
    }

    pub fn set_material(&mut self, library: &str, name: &str) {
        self.current_material_library = library.to_string();
        self.current_material_name = name.to_string();
    }

    pub fn set_local_transform(&mut self, transform: Matrix4<f32>) {
        self.current_transform = transform;
    }

    /// Set the bounding box the next `build` rescales the geometry into.
    pub fn set_target_bounds(&mut self, target: Aabb, centering: Centering) {
        self.target_bounds = Some(target);
        self.centering = centering;
        self.dirty = true;
    }

    /// Remap the geometry into the target bounding box, if one is set and
    /// differs from the current box.
    ///
    /// The scale is uniform: target max axis size over current max axis size.
    /// On axes where the scaled mesh is smaller than the target, the
    /// centering policy decides where the slack goes. Applying the same
    /// target twice is a no-op the second time.
    pub fn rescale(&mut self) {
        let Some(target) = self.target_bounds else {
            return;
        };
        if self.bounds.is_empty() || self.bounds.approx_eq(&target, 1e-5) {
            return;
        }
        let current_size = self.bounds.max_size();
        if current_size <= 0.0 {
            return;
        }
        let scale = target.max_size() / current_size;

        let scaled_size = self.bounds.size() * scale;
        let slack = target.size() - scaled_size;
        let mut offset = target.min - self.bounds.min * scale;
        for axis in 0..3 {
            if slack[axis] > 0.0 {
                offset[axis] += match self.centering[axis] {
                    0 => slack[axis] * 0.5,
                    c if c > 0 => slack[axis],
                    _ => 0.0,
                };
            }
        }

        for chunk in self.vertices.chunks_mut(FLOATS_PER_VERTEX) {
            chunk[0] = chunk[0] * scale + offset.x;
            chunk[1] = chunk[1] * scale + offset.y;
            chunk[2] = chunk[2] * scale + offset.z;
        }
        self.edge_mesh.transform_vertices(scale, offset);

        let min = self.bounds.min * scale + offset;
        let max = self.bounds.max * scale + offset;
        self.bounds = Aabb::new(min, max);
        self.dirty = true;
    }

    /// Upload vertex and index arrays to the device. No-op while clean.
    pub fn build(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.rescale();
        if let Some(old) = self.vertex_buffer.take() {
            device.destroy_buffer(old);
        }
        if let Some(old) = self.index_buffer.take() {
            device.destroy_buffer(old);
        }
        self.vertex_buffer = Some(device.create_buffer(
            BufferTarget::Vertex,
            bytemuck::cast_slice(&self.vertices),
        )?);
        self.index_buffer = Some(device.create_buffer(
            BufferTarget::Index,
            bytemuck::cast_slice(&self.indices),
        )?);
        self.dirty = false;
        Ok(())
    }

    /// Draw every surface, activating its material between draws.
    pub fn render(
        &mut self,
        device: &mut dyn GpuDevice,
        config: &mut RenderConfig,
        materials: &MaterialStore,
    ) -> Result<()> {
        self.build(device)?;
        let (Some(vbo), Some(ibo)) = (self.vertex_buffer, self.index_buffer) else {
            return Ok(());
        };
        let attributes = vertex_attributes();
        for surface in &self.surfaces {
            if surface.count == 0 {
                continue;
            }
            materials.apply(
                device,
                config,
                &surface.material_library,
                &surface.material_name,
            );
            config.uniform_matrix4f(device, "localMatrix", &surface.local_transform);
            device.draw_indexed(
                surface.mode,
                vbo,
                ibo,
                &attributes,
                surface.start,
                surface.count,
            );
        }
        Ok(())
    }

    /// Draw the derived edge list instead of the filled surfaces.
    ///
    /// The line list covers the whole mesh in one draw, so the first
    /// surface's local transform stands in for all of them.
    pub fn render_edges(
        &mut self,
        device: &mut dyn GpuDevice,
        config: &mut RenderConfig,
    ) -> Result<()> {
        self.build(device)?;
        self.edge_mesh.build_buffers(device)?;
        let transform = self
            .surfaces
            .first()
            .map(|s| s.local_transform)
            .unwrap_or_else(Matrix4::identity);
        config.uniform_matrix4f(device, "localMatrix", &transform);
        self.edge_mesh.render(device);
        Ok(())
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        if let Some(buffer) = self.vertex_buffer.take() {
            device.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            device.destroy_buffer(buffer);
        }
        self.edge_mesh.destroy(device);
    }

    /// Ingest the OBJ geometry grammar.
    ///
    /// Attribute statements fill the raw pools; `f` lines fan-triangulate
    /// into the index stream and feed the raw corner list to the edge mesh.
    /// `mtllib`/`usemtl`/`o`/`g`/`s` each close the current surface. Returns
    /// the material-library URLs the file references so the owner can load
    /// them.
    pub fn ingest_obj(&mut self, text: &str) -> Vec<String> {
        let mut positions: Vec<Vector3<f32>> = Vec::new();
        let mut normals: Vec<Vector3<f32>> = Vec::new();
        let mut texcoords: Vec<Vector3<f32>> = Vec::new();
        let mut colors: Vec<Vector3<f32>> = Vec::new();
        let mut libraries: Vec<String> = Vec::new();
        // Position index -> edge-mesh vertex, so faces sharing a position
        // share the same edge endpoints.
        let mut edge_vertices: HashMap<i32, u32> = HashMap::new();

        for tokens in parse::parse(text) {
            match tokens[0].as_str() {
                "v" => positions.push(parse::parse_vector3(&tokens)),
                "vn" => normals.push(parse::parse_vector3(&tokens)),
                "vt" => texcoords.push(parse::parse_vector3(&tokens)),
                "vc" => colors.push(parse::parse_vector3(&tokens)),
                "mtllib" => {
                    if let Some(url) = tokens.get(1) {
                        if !libraries.iter().any(|l| l == url) {
                            libraries.push(url.clone());
                        }
                        self.set_material(url, "");
                    }
                    self.begin(PrimitiveMode::Triangles);
                }
                "usemtl" => {
                    let name = tokens.get(1).cloned().unwrap_or_default();
                    let library = self.current_material_library.clone();
                    self.set_material(&library, &name);
                    self.begin(PrimitiveMode::Triangles);
                }
                "o" | "g" | "s" => self.begin(PrimitiveMode::Triangles),
                "f" => self.ingest_face(
                    &tokens[1..],
                    &positions,
                    &normals,
                    &texcoords,
                    &colors,
                    &mut edge_vertices,
                ),
                other => debug!("{}: unknown obj keyword {}, ignoring", self.name, other),
            }
        }
        libraries
    }

    /// Resolve one face line: append a vertex per corner, fan-triangulate the
    /// n-gon from corner 0 and register the face with the edge mesh keyed by
    /// its position indices, so faces sharing a geometric edge land on the
    /// same [`Edge`](crate::data_structures::edge_mesh::Edge).
    fn ingest_face(
        &mut self,
        corner_tokens: &[String],
        positions: &[Vector3<f32>],
        normals: &[Vector3<f32>],
        texcoords: &[Vector3<f32>],
        colors: &[Vector3<f32>],
        edge_vertices: &mut HashMap<i32, u32>,
    ) {
        if corner_tokens.len() < 3 {
            warn!("{}: face with fewer than 3 corners, skipping", self.name);
            return;
        }
        let corners: Vec<parse::FaceIndices> = corner_tokens
            .iter()
            .map(|t| parse::parse_face_indices(t, positions.len(), texcoords.len(), normals.len()))
            .collect();

        let resolved: Option<Vec<Vector3<f32>>> = corners
            .iter()
            .map(|c| {
                if c.position < 0 {
                    None
                } else {
                    positions.get(c.position as usize).copied()
                }
            })
            .collect();
        let Some(resolved) = resolved else {
            warn!("{}: face references missing positions, skipping", self.name);
            return;
        };
        // Fallback normal for corners without an explicit one.
        let raw = (resolved[1] - resolved[0]).cross(resolved[2] - resolved[0]);
        let face_normal = if raw.magnitude2() > 0.0 {
            raw.normalize()
        } else {
            Vector3::zero()
        };

        if self.surfaces.is_empty() {
            self.begin(PrimitiveMode::Triangles);
        }

        let base = self.vertex_count() as i64;
        for (corner, position) in corners.iter().zip(&resolved) {
            let normal = if corner.normal >= 0 {
                normals
                    .get(corner.normal as usize)
                    .copied()
                    .unwrap_or(face_normal)
            } else {
                face_normal
            };
            self.normal(normal.x, normal.y, normal.z);
            let texcoord = if corner.texcoord >= 0 {
                texcoords
                    .get(corner.texcoord as usize)
                    .copied()
                    .unwrap_or_else(Vector3::zero)
            } else {
                Vector3::zero()
            };
            self.texcoord(texcoord.x, texcoord.y, texcoord.z);
            // Vertex colors index the same pool positions do.
            let color = colors
                .get(corner.position as usize)
                .copied()
                .unwrap_or_else(|| Vector3::new(1.0, 1.0, 1.0));
            self.color(color.x, color.y, color.z);
            self.vertex(position.x, position.y, position.z);
        }

        let corner_count = corners.len() as i64;
        for i in 1..corner_count - 1 {
            self.add_index(base);
            self.add_index(base + i);
            self.add_index(base + i + 1);
        }

        let mut face_indices: Vec<i64> = Vec::with_capacity(corners.len());
        for (corner, position) in corners.iter().zip(&resolved) {
            let index = *edge_vertices
                .entry(corner.position)
                .or_insert_with(|| self.edge_mesh.add_vertex(*position));
            face_indices.push(index as i64);
        }
        self.edge_mesh.add_face(&face_indices);
    }
}
