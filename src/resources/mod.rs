//! Asset fetching and readiness tracking.
//!
//! - `loader` deduplicates named requests and tracks per-kind readiness
//! - `source` is the transport that actually fetches bytes (disk, tests)

pub mod loader;
pub mod source;

pub use loader::{AssetLoader, AssetPayload, AssetState, CompletedAsset};
pub use source::{AssetSource, CompletionSender, FetchCompletion, FileSource};

/// The closed set of asset kinds the scenegraph knows how to process.
///
/// Classification happens once, from the file extension, and every completion
/// is dispatched through an exhaustive match on this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Scene,
    Geometry,
    Material,
    Image,
    Shader,
    Text,
}

impl AssetKind {
    /// Every kind, for aggregate readiness queries.
    pub const ALL: [AssetKind; 6] = [
        AssetKind::Scene,
        AssetKind::Geometry,
        AssetKind::Material,
        AssetKind::Image,
        AssetKind::Shader,
        AssetKind::Text,
    ];

    /// Classify a URL by its extension. Anything unrecognized is plain text.
    pub fn from_url(url: &str) -> Self {
        let extension = url
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("scn") => AssetKind::Scene,
            Some("obj") => AssetKind::Geometry,
            Some("mtl") => AssetKind::Material,
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "tif" | "tiff" | "bmp" | "tga") => {
                AssetKind::Image
            }
            Some("vert" | "frag" | "glsl" | "vs" | "fs") => AssetKind::Shader,
            _ => AssetKind::Text,
        }
    }

    /// Whether the payload should be decoded as image pixels rather than text.
    pub fn is_image(self) -> bool {
        matches!(self, AssetKind::Image)
    }
}
