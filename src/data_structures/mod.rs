//! Engine data structures: meshes, derived adjacency, materials.
//!
//! - `mesh` contains the indexed geometry builder, surfaces and rescaling
//! - `edge_mesh` derives the edge/face adjacency for wireframe rendering
//! - `material` holds material definitions and the MTL grammar

pub mod edge_mesh;
pub mod material;
pub mod mesh;
