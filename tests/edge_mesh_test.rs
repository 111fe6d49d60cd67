use prism_ngin::Vector3;
use prism_ngin::data_structures::edge_mesh::EdgeMesh;

use crate::common::test_utils::TraceDevice;

mod common;

fn planar_quad() -> EdgeMesh {
    let mut em = EdgeMesh::new();
    em.add_vertex(Vector3::new(0.0, 0.0, 0.0));
    em.add_vertex(Vector3::new(1.0, 0.0, 0.0));
    em.add_vertex(Vector3::new(1.0, 1.0, 0.0));
    em.add_vertex(Vector3::new(0.0, 1.0, 0.0));
    em
}

#[test]
fn one_face_yields_one_edge_per_side() {
    let mut em = planar_quad();
    em.add_face(&[0, 1, 2, 3]);

    assert_eq!(em.edge_count(), 4);
    assert_eq!(em.faces().len(), 1);
    let face = &em.faces()[0];
    assert_eq!(face.normal, Vector3::new(0.0, 0.0, 1.0));
    assert_eq!(face.centroid, Vector3::new(0.5, 0.5, 0.0));
}

#[test]
fn face_side_follows_call_site_vertex_order() {
    let mut em = planar_quad();
    em.add_face(&[0, 1, 2]);

    // Edge (0,1) was fed in canonical order, so the face is its left face.
    let e01 = em.edge(0, 1).unwrap();
    assert_eq!(e01.left_face, Some(0));
    assert_eq!(e01.right_face, None);

    // The wrapping edge (2,0) arrived reversed, landing on the right.
    let e02 = em.edge(0, 2).unwrap();
    assert_eq!(e02.right_face, Some(0));
    assert_eq!(e02.left_face, None);
}

#[test]
fn boundary_edges_keep_the_raw_accumulated_normal() {
    let mut em = planar_quad();
    // Two faces with distinct (but unit) normals sharing no edge scale.
    em.add_face(&[0, 1, 2]);

    let edge = em.edge(0, 1).unwrap();
    // Only one face contributed; the accumulated normal is its raw normal.
    assert_eq!(edge.normal, Vector3::new(0.0, 0.0, 1.0));
    assert_eq!(edge.left_normal, Vector3::new(0.0, 0.0, 1.0));
    assert_eq!(edge.right_normal, Vector3::new(0.0, 0.0, 0.0));
}

#[test]
fn shared_edge_normal_is_renormalized_once_both_faces_land() {
    let mut em = EdgeMesh::new();
    em.add_vertex(Vector3::new(0.0, 0.0, 0.0));
    em.add_vertex(Vector3::new(1.0, 0.0, 0.0));
    em.add_vertex(Vector3::new(0.0, 1.0, 0.0));
    em.add_vertex(Vector3::new(0.0, 0.0, 1.0));

    // Face in the xy plane (+z) and face in the xz plane (+y), sharing 0-1.
    em.add_face(&[0, 1, 2]);
    em.add_face(&[1, 0, 3]);

    let edge = em.edge(0, 1).unwrap();
    assert!(edge.left_face.is_some());
    assert!(edge.right_face.is_some());
    // Unit length: (0,1,1)/sqrt(2).
    let expected = 1.0 / 2.0f32.sqrt();
    assert!((edge.normal.y - expected).abs() < 1e-6);
    assert!((edge.normal.z - expected).abs() < 1e-6);
    assert!(edge.normal.x.abs() < 1e-6);
}

#[test]
fn negative_face_indices_resolve_against_vertex_count() {
    let mut em = planar_quad();
    em.add_face(&[-4, -3, -2]);
    assert_eq!(em.faces()[0].indices, vec![0, 1, 2]);
}

#[test]
fn degenerate_input_is_rejected() {
    let mut em = planar_quad();
    em.add_face(&[0, 1]);
    assert_eq!(em.faces().len(), 0);

    em.add_face(&[0, 1, 7]);
    assert_eq!(em.faces().len(), 0);
    assert_eq!(em.edge_count(), 0);
}

#[test]
fn line_buffer_is_memoized_behind_the_dirty_flag() {
    let mut device = TraceDevice::new();
    let mut em = planar_quad();
    em.add_face(&[0, 1, 2, 3]);

    em.build_buffers(&mut device).unwrap();
    assert_eq!(device.buffer_creates, 1);
    em.build_buffers(&mut device).unwrap();
    assert_eq!(device.buffer_creates, 1);

    em.render(&mut device);
    assert_eq!(device.draws.len(), 1);
    assert!(!device.draws[0].indexed);
    // Two endpoints per edge.
    assert_eq!(device.draws[0].count, 8);
}
