// tests/structure_transforms.rs
use approx::assert_abs_diff_eq;
use glam::{DAffine3, DMat3, DVec3};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use tensegrity_kit::{StructureGraph, Tagged};

fn assert_vec_eq(a: DVec3, b: DVec3) {
    assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-9);
    assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-9);
    assert_abs_diff_eq!(a.z, b.z, epsilon = 1e-9);
}

#[test]
fn test_quarter_turn_about_y() {
    let mut s = StructureGraph::new();
    s.add_node(1.0, 0.0, 0.0);
    s.add_rotation(DVec3::ZERO, DVec3::Y, FRAC_PI_2).unwrap();
    assert_vec_eq(s.nodes()[0], DVec3::new(0.0, 0.0, -1.0));
}

#[test]
fn test_rotation_about_offset_pivot() {
    // Rotating (2,0,0) about a Z axis through (1,0,0) swings it to (1,1,0).
    let mut s = StructureGraph::new();
    s.add_node(2.0, 0.0, 0.0);
    s.add_rotation(DVec3::X, DVec3::Z, FRAC_PI_2).unwrap();
    assert_vec_eq(s.nodes()[0], DVec3::new(1.0, 1.0, 0.0));
}

#[test]
fn test_composed_rotations_match_matrix_product() {
    let mut s = StructureGraph::new();
    let p = DVec3::new(0.3, -1.2, 2.5);
    s.add_node_at(p);
    s.add_rotation(DVec3::ZERO, DVec3::Y, FRAC_PI_4).unwrap();
    s.add_rotation(DVec3::ZERO, DVec3::X, FRAC_PI_2).unwrap();

    // Second rotation applies after the first: R = Rx * Ry.
    let product =
        DMat3::from_axis_angle(DVec3::X, FRAC_PI_2) * DMat3::from_axis_angle(DVec3::Y, FRAC_PI_4);
    assert_vec_eq(s.nodes()[0], product * p);

    let accumulated = s.transform();
    assert_vec_eq(accumulated.transform_point3(p), product * p);

    // The other order lands somewhere else.
    let swapped =
        DMat3::from_axis_angle(DVec3::Y, FRAC_PI_4) * DMat3::from_axis_angle(DVec3::X, FRAC_PI_2);
    assert!((swapped * p).distance(s.nodes()[0]) > 1e-3);
}

#[test]
fn test_transforms_propagate_to_children_in_order() {
    let mut child = StructureGraph::with_tags("segment");
    child.add_node(1.0, 0.0, 0.0);

    let mut parent = StructureGraph::new();
    parent.add_node(1.0, 0.0, 0.0);
    parent.add_child(child);
    parent.move_by(DVec3::new(0.0, 0.0, 5.0));
    parent.add_rotation(DVec3::ZERO, DVec3::Y, FRAC_PI_2).unwrap();

    // Translate then rotate: (1,0,5) -> (5,0,-1).
    let expected = DVec3::new(5.0, 0.0, -1.0);
    assert_vec_eq(parent.nodes()[0], expected);
    assert_vec_eq(parent.children()[0].nodes()[0], expected);
    assert!(parent.children()[0].has_tag("segment"));

    let composed = DAffine3::from_axis_angle(DVec3::Y, FRAC_PI_2)
        * DAffine3::from_translation(DVec3::new(0.0, 0.0, 5.0));
    assert!(parent.transform().abs_diff_eq(composed, 1e-12));
    assert!(parent.children()[0].transform().abs_diff_eq(composed, 1e-12));
}

#[test]
fn test_children_added_later_keep_their_frame() {
    let mut parent = StructureGraph::new();
    parent.move_by(DVec3::new(10.0, 0.0, 0.0));

    let mut child = StructureGraph::new();
    child.add_node(0.0, 1.0, 0.0);
    parent.add_child(child);

    assert_vec_eq(parent.children()[0].nodes()[0], DVec3::new(0.0, 1.0, 0.0));
    assert_eq!(parent.total_nodes(), 1);
}

#[test]
fn test_zero_axis_is_rejected() {
    let mut s = StructureGraph::new();
    s.add_node(1.0, 0.0, 0.0);
    assert!(s.add_rotation(DVec3::ZERO, DVec3::ZERO, 1.0).is_err());
    assert_vec_eq(s.nodes()[0], DVec3::X);
}
