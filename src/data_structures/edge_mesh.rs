//! Derived adjacency structure for wireframe and edge-highlight rendering.
//!
//! An [`EdgeMesh`] shadows its owning mesh: vertices are re-inserted
//! explicitly as faces are fed in, and every unordered vertex pair becomes an
//! [`Edge`] that knows which faces border it. Edge normals accumulate the
//! adjoining face normals and are renormalized exactly once, when the second
//! face registers. A boundary edge keeps the single face's raw contribution.

use std::collections::BTreeMap;

use anyhow::Result;
use cgmath::{InnerSpace, Vector3, Zero};
use log::warn;

use crate::device::{BufferId, BufferTarget, GpuDevice, PrimitiveMode, VertexAttribute};

/// Key separation for the unordered-pair edge map. Indices are shifted by one
/// so the zero key is never produced; `1 << 32` keeps 32-bit indices
/// collision-free and totally ordered.
const SEPARATION: u64 = 1 << 32;

/// Canonical key for the unordered pair `(v1, v2)`.
fn edge_key(v1: u32, v2: u32) -> u64 {
    let (lo, hi) = if v1 < v2 { (v1, v2) } else { (v2, v1) };
    (lo as u64 + 1) * SEPARATION + (hi as u64 + 1)
}

/// One edge of the mesh with its adjoining faces.
#[derive(Clone, Debug)]
pub struct Edge {
    pub v1: u32,
    pub v2: u32,
    pub left_face: Option<u32>,
    pub right_face: Option<u32>,
    pub left_normal: Vector3<f32>,
    pub right_normal: Vector3<f32>,
    /// Accumulated face normals; unit-length once both faces have registered.
    pub normal: Vector3<f32>,
}

/// One input face with its derived centroid and normal.
#[derive(Clone, Debug)]
pub struct Face {
    pub indices: Vec<u32>,
    pub centroid: Vector3<f32>,
    pub normal: Vector3<f32>,
    /// Centroid offset along the normal, used to visualize face normals.
    pub normal_point: Vector3<f32>,
}

/// Distance of the normal-visualization point from the face centroid.
const NORMAL_POINT_OFFSET: f32 = 0.25;

#[derive(Default)]
pub struct EdgeMesh {
    vertices: Vec<Vector3<f32>>,
    edges: BTreeMap<u64, Edge>,
    faces: Vec<Face>,
    dirty: bool,
    line_buffer: Option<BufferId>,
    line_vertex_count: usize,
}

impl EdgeMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-insert a vertex position shared with the owning mesh. Returns the
    /// index the position landed at.
    pub fn add_vertex(&mut self, position: Vector3<f32>) -> u32 {
        self.vertices.push(position);
        self.dirty = true;
        (self.vertices.len() - 1) as u32
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, v1: u32, v2: u32) -> Option<&Edge> {
        self.edges.get(&edge_key(v1, v2))
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Register a face by its vertex indices (at least three). Negative
    /// indices resolve against the current vertex count. The face normal is
    /// taken from the first three vertices; every consecutive index pair
    /// (wrapping) becomes an edge.
    pub fn add_face(&mut self, indices: &[i64]) {
        if indices.len() < 3 {
            warn!("edge mesh face needs at least 3 indices, got {}", indices.len());
            return;
        }
        let resolved: Vec<u32> = indices
            .iter()
            .map(|&i| {
                if i < 0 {
                    (self.vertices.len() as i64 + i) as u32
                } else {
                    i as u32
                }
            })
            .collect();
        if resolved
            .iter()
            .any(|&i| i as usize >= self.vertices.len())
        {
            warn!("edge mesh face references missing vertices, skipping");
            return;
        }

        let p0 = self.vertices[resolved[0] as usize];
        let p1 = self.vertices[resolved[1] as usize];
        let p2 = self.vertices[resolved[2] as usize];
        let raw = (p1 - p0).cross(p2 - p0);
        let normal = if raw.magnitude2() > 0.0 {
            raw.normalize()
        } else {
            Vector3::zero()
        };
        let centroid = resolved
            .iter()
            .fold(Vector3::zero(), |acc: Vector3<f32>, &i| {
                acc + self.vertices[i as usize]
            })
            / resolved.len() as f32;

        let face_index = self.faces.len() as u32;
        self.faces.push(Face {
            indices: resolved.clone(),
            centroid,
            normal,
            normal_point: centroid + normal * NORMAL_POINT_OFFSET,
        });

        for i in 0..resolved.len() {
            let v1 = resolved[i];
            let v2 = resolved[(i + 1) % resolved.len()];
            self.add_edge(v1, v2, face_index, normal);
        }
        self.dirty = true;
    }

    /// Record one face against the edge `(v1, v2)`.
    ///
    /// The face lands on the "left" when the call-site order is already
    /// canonical (`v1 < v2`), on the "right" otherwise. The accumulated
    /// normal is renormalized the moment both sides are known.
    fn add_edge(&mut self, v1: u32, v2: u32, face: u32, face_normal: Vector3<f32>) {
        if v1 == v2 {
            warn!("degenerate edge {}-{}, skipping", v1, v2);
            return;
        }
        let left = v1 < v2;
        let edge = self.edges.entry(edge_key(v1, v2)).or_insert_with(|| Edge {
            v1: v1.min(v2),
            v2: v1.max(v2),
            left_face: None,
            right_face: None,
            left_normal: Vector3::zero(),
            right_normal: Vector3::zero(),
            normal: Vector3::zero(),
        });
        if left {
            edge.left_face = Some(face);
            edge.left_normal = face_normal;
        } else {
            edge.right_face = Some(face);
            edge.right_normal = face_normal;
        }
        edge.normal += face_normal;
        if edge.left_face.is_some() && edge.right_face.is_some() && edge.normal.magnitude2() > 0.0 {
            edge.normal = edge.normal.normalize();
        }
    }

    /// Apply an affine remap to every re-inserted vertex, keeping the edge
    /// mesh consistent with a rescaled owner.
    pub(crate) fn transform_vertices(&mut self, scale: f32, offset: Vector3<f32>) {
        for vertex in &mut self.vertices {
            *vertex = *vertex * scale + offset;
        }
        self.dirty = true;
    }

    /// Upload the line-list buffer, memoized behind the dirty flag.
    pub fn build_buffers(&mut self, device: &mut dyn GpuDevice) -> Result<()> {
        if !self.dirty && self.line_buffer.is_some() {
            return Ok(());
        }
        let mut lines: Vec<f32> = Vec::with_capacity(self.edges.len() * 6);
        for edge in self.edges.values() {
            for &v in [edge.v1, edge.v2].iter() {
                let p = self.vertices[v as usize];
                lines.extend_from_slice(&[p.x, p.y, p.z]);
            }
        }
        if let Some(old) = self.line_buffer.take() {
            device.destroy_buffer(old);
        }
        self.line_buffer = Some(device.create_buffer(
            BufferTarget::Vertex,
            bytemuck::cast_slice(&lines),
        )?);
        self.line_vertex_count = self.edges.len() * 2;
        self.dirty = false;
        Ok(())
    }

    /// Draw the derived line list. Buffers must have been built.
    pub fn render(&self, device: &mut dyn GpuDevice) {
        let Some(buffer) = self.line_buffer else {
            return;
        };
        device.draw_arrays(
            PrimitiveMode::Lines,
            buffer,
            &[VertexAttribute {
                location: 0,
                components: 3,
                offset: 0,
                stride: 12,
            }],
            0,
            self.line_vertex_count,
        );
    }

    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        if let Some(buffer) = self.line_buffer.take() {
            device.destroy_buffer(buffer);
        }
    }
}
