use prism_ngin::parse::{parse, parse_face_indices, parse_matrix, parse_vector3, parse_vector4};
use prism_ngin::{Vector3, Vector4};

#[test]
fn tokenizer_drops_comments_and_blank_lines() {
    let text = "# header comment\n\nv 1 2 3\r\n   \n#another\nvn 0 1 0";
    let lines = parse(text);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], vec!["v", "1", "2", "3"]);
    assert_eq!(lines[1], vec!["vn", "0", "1", "0"]);
}

#[test]
fn tokenizer_splits_on_carriage_returns_alone() {
    let lines = parse("a 1\rb 2");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0][0], "a");
    assert_eq!(lines[1][0], "b");
}

#[test]
fn vector3_defaults_missing_fields_to_zero() {
    let tokens: Vec<String> = ["v", "1.5", "2.5"].iter().map(|s| s.to_string()).collect();
    assert_eq!(parse_vector3(&tokens), Vector3::new(1.5, 2.5, 0.0));

    let tokens: Vec<String> = ["v"].iter().map(|s| s.to_string()).collect();
    assert_eq!(parse_vector3(&tokens), Vector3::new(0.0, 0.0, 0.0));
}

#[test]
fn vector3_treats_malformed_fields_as_zero() {
    let tokens: Vec<String> = ["v", "x", "2", "3"].iter().map(|s| s.to_string()).collect();
    assert_eq!(parse_vector3(&tokens), Vector3::new(0.0, 2.0, 3.0));
}

#[test]
fn vector4_reads_four_fields() {
    let tokens: Vec<String> = ["rotate", "90", "0", "1", "0"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(parse_vector4(&tokens), Vector4::new(90.0, 0.0, 1.0, 0.0));
}

#[test]
fn matrix_is_stored_transposed() {
    let mut tokens = vec!["transform".to_string()];
    tokens.extend((1..=16).map(|i| i.to_string()));
    let m = parse_matrix(&tokens).unwrap();
    // The row-major first row lands in the first column.
    assert_eq!(m.x, Vector4::new(1.0, 2.0, 3.0, 4.0));
    assert_eq!(m.y, Vector4::new(5.0, 6.0, 7.0, 8.0));
    assert_eq!(m.w, Vector4::new(13.0, 14.0, 15.0, 16.0));
}

#[test]
fn matrix_rejects_wrong_arity_and_bad_floats() {
    let short: Vec<String> = ["transform", "1", "2"].iter().map(|s| s.to_string()).collect();
    assert!(parse_matrix(&short).is_none());

    let mut bad = vec!["transform".to_string()];
    bad.extend((1..=15).map(|i| i.to_string()));
    bad.push("oops".to_string());
    assert!(parse_matrix(&bad).is_none());
}

#[test]
fn face_indices_cover_all_four_forms() {
    let f = parse_face_indices("3", 8, 8, 8);
    assert_eq!((f.position, f.texcoord, f.normal), (2, -1, -1));

    let f = parse_face_indices("1/2", 8, 8, 8);
    assert_eq!((f.position, f.texcoord, f.normal), (0, 1, -1));

    let f = parse_face_indices("4//5", 8, 8, 8);
    assert_eq!((f.position, f.texcoord, f.normal), (3, -1, 4));

    let f = parse_face_indices("1/2/3", 8, 8, 8);
    assert_eq!((f.position, f.texcoord, f.normal), (0, 1, 2));
}

#[test]
fn negative_face_indices_resolve_against_pool_lengths() {
    // -1 is the last element of each pool at parse time.
    let f = parse_face_indices("-1/-2/-3", 10, 5, 7);
    assert_eq!((f.position, f.texcoord, f.normal), (9, 3, 4));
}
