//! Line-oriented text-format tokenizer and typed value helpers.
//!
//! All three description grammars (SCN scene files, OBJ geometry, MTL
//! materials) share the same surface syntax: one statement per line,
//! whitespace-separated tokens, `#` comment lines. `parse` reduces a text
//! asset to token lines; the typed helpers below extract vectors, matrices
//! and face-index tuples from a single line.
//!
//! Malformed values never fail the parse. Missing trailing vector fields
//! default to 0.0 and unknown keywords are the caller's business to skip,
//! so forward-compatible files keep loading.

use cgmath::{Matrix4, Vector3, Vector4};

/// Tokenize a text asset into lines of whitespace-separated tokens.
///
/// Splits on runs of `\n`/`\r`, drops empty lines and lines whose first
/// token starts with `#`.
pub fn parse(text: &str) -> Vec<Vec<String>> {
    text.split(['\n', '\r'])
        .filter_map(|line| {
            let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            match tokens.first() {
                None => None,
                Some(first) if first.starts_with('#') => None,
                Some(_) => Some(tokens),
            }
        })
        .collect()
}

fn numeric(token: Option<&String>) -> f32 {
    token.and_then(|t| t.parse::<f32>().ok()).unwrap_or(0.0)
}

/// Read up to three numeric fields after the leading keyword token.
pub fn parse_vector3(tokens: &[String]) -> Vector3<f32> {
    Vector3::new(
        numeric(tokens.get(1)),
        numeric(tokens.get(2)),
        numeric(tokens.get(3)),
    )
}

/// Read up to four numeric fields after the leading keyword token.
pub fn parse_vector4(tokens: &[String]) -> Vector4<f32> {
    Vector4::new(
        numeric(tokens.get(1)),
        numeric(tokens.get(2)),
        numeric(tokens.get(3)),
        numeric(tokens.get(4)),
    )
}

/// Parse a `transform` line: keyword plus 16 row-major floats.
///
/// The flat row-major sequence is loaded straight into cgmath's column-major
/// storage, so the returned matrix is the transpose of the row-major reading.
/// Lines without exactly 16 fields yield `None`.
pub fn parse_matrix(tokens: &[String]) -> Option<Matrix4<f32>> {
    if tokens.len() != 17 {
        return None;
    }
    let mut m = [0.0f32; 16];
    for (slot, token) in m.iter_mut().zip(&tokens[1..]) {
        *slot = token.parse().ok()?;
    }
    // Matrix4::new takes column-major arguments.
    Some(Matrix4::new(
        m[0], m[1], m[2], m[3], m[4], m[5], m[6], m[7], m[8], m[9], m[10], m[11], m[12], m[13],
        m[14], m[15],
    ))
}

/// One corner of a face: indices into the position/texcoord/normal pools,
/// 0-based, `-1` for "absent".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceIndices {
    pub position: i32,
    pub texcoord: i32,
    pub normal: i32,
}

fn resolve_index(field: Option<&str>, pool_len: usize) -> i32 {
    match field.and_then(|f| f.parse::<i64>().ok()) {
        // 1-based; negative means relative to the end of the current pool.
        Some(i) if i > 0 => (i - 1) as i32,
        Some(i) if i < 0 => (pool_len as i64 + i) as i32,
        _ => -1,
    }
}

/// Parse one `v`, `v/t`, `v//n` or `v/t/n` face token.
///
/// Negative indices resolve against the pool lengths at the time the face
/// line is parsed, matching the OBJ convention of "relative to the current
/// vertex count".
pub fn parse_face_indices(
    token: &str,
    position_pool: usize,
    texcoord_pool: usize,
    normal_pool: usize,
) -> FaceIndices {
    let mut fields = token.split('/');
    FaceIndices {
        position: resolve_index(fields.next(), position_pool),
        texcoord: resolve_index(fields.next(), texcoord_pool),
        normal: resolve_index(fields.next(), normal_pool),
    }
}
