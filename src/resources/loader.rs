//! Deduplicated asset loading with per-kind readiness aggregates.
//!
//! Each named asset is requested at most once; re-requesting the same name is
//! a no-op. Fetches are initiated immediately through the [`AssetSource`] and
//! complete in any order via the loader's channel. `poll` drains completed
//! fetches, decodes payloads and returns them for grammar dispatch.
//!
//! A failed request is terminal: no retry, no backpressure. It flips the
//! aggregate `failed` flag for its kind but never blocks sibling requests.

use std::collections::HashMap;

use futures::channel::mpsc::{UnboundedReceiver, unbounded};
use log::{debug, warn};

use crate::resources::{AssetKind, AssetSource, FetchCompletion};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetState {
    Pending,
    Loaded,
    Failed,
}

/// Decoded asset payload.
#[derive(Clone, Debug)]
pub enum AssetPayload {
    Text(String),
    Image {
        width: u32,
        height: u32,
        rgba: Vec<u8>,
    },
}

struct AssetRequest {
    url: String,
    kind: AssetKind,
    state: AssetState,
    /// Caller-supplied tag handed back with the completion, used by the
    /// scenegraph to route a payload to the structure that requested it.
    tag: String,
}

/// A finished fetch handed back from [`AssetLoader::poll`].
#[derive(Clone, Debug)]
pub struct CompletedAsset {
    pub name: String,
    pub kind: AssetKind,
    pub tag: String,
    pub payload: Option<AssetPayload>,
}

/// Registry of every asset ever requested, keyed by name.
pub struct AssetLoader {
    requests: HashMap<String, AssetRequest>,
    source: Box<dyn AssetSource>,
    completions: UnboundedReceiver<FetchCompletion>,
    sender: crate::resources::CompletionSender,
}

impl AssetLoader {
    pub fn new(source: Box<dyn AssetSource>) -> Self {
        let (sender, completions) = unbounded();
        Self {
            requests: HashMap::new(),
            source,
            completions,
            sender,
        }
    }

    /// Register and start a fetch. At most one request per `name`; a second
    /// call with the same name does nothing.
    pub fn load(&mut self, name: &str, url: &str, kind: AssetKind, tag: &str) {
        if self.requests.contains_key(name) {
            debug!("asset {} already requested, skipping", name);
            return;
        }
        self.requests.insert(
            name.to_string(),
            AssetRequest {
                url: url.to_string(),
                kind,
                state: AssetState::Pending,
                tag: tag.to_string(),
            },
        );
        self.source.fetch(name, url, self.sender.clone());
    }

    pub fn was_requested(&self, name: &str) -> bool {
        self.requests.contains_key(name)
    }

    pub fn state(&self, name: &str) -> Option<AssetState> {
        self.requests.get(name).map(|r| r.state)
    }

    /// All requests of `kind` have loaded (an empty set counts as loaded).
    pub fn loaded(&self, kind: AssetKind) -> bool {
        self.requests
            .values()
            .filter(|r| r.kind == kind)
            .all(|r| r.state == AssetState::Loaded)
    }

    /// Any request of `kind` has failed.
    pub fn failed(&self, kind: AssetKind) -> bool {
        self.requests
            .values()
            .any(|r| r.kind == kind && r.state == AssetState::Failed)
    }

    /// Fraction of requests of `kind` no longer pending, in 0..=1.
    pub fn percent_loaded(&self, kind: AssetKind) -> f32 {
        let mut total = 0usize;
        let mut settled = 0usize;
        for request in self.requests.values().filter(|r| r.kind == kind) {
            total += 1;
            if request.state != AssetState::Pending {
                settled += 1;
            }
        }
        if total == 0 {
            1.0
        } else {
            settled as f32 / total as f32
        }
    }

    /// Drain every completion delivered since the last poll.
    ///
    /// Decodes payloads by kind, records the terminal state and hands the
    /// finished assets back in delivery order. Delivery order carries no
    /// guarantee relative to request order.
    pub fn poll(&mut self) -> Vec<CompletedAsset> {
        let mut finished = Vec::new();
        while let Ok(Some(completion)) = self.completions.try_next() {
            let Some(request) = self.requests.get_mut(&completion.name) else {
                warn!("completion for unknown asset {}", completion.name);
                continue;
            };
            let payload = completion
                .result
                .and_then(|bytes| decode(request.kind, &bytes, &request.url));
            match payload {
                Ok(payload) => {
                    request.state = AssetState::Loaded;
                    finished.push(CompletedAsset {
                        name: completion.name,
                        kind: request.kind,
                        tag: request.tag.clone(),
                        payload: Some(payload),
                    });
                }
                Err(e) => {
                    warn!("asset {} failed to load: {}", completion.name, e);
                    request.state = AssetState::Failed;
                    finished.push(CompletedAsset {
                        name: completion.name,
                        kind: request.kind,
                        tag: request.tag.clone(),
                        payload: None,
                    });
                }
            }
        }
        finished
    }
}

fn decode(kind: AssetKind, bytes: &[u8], url: &str) -> anyhow::Result<AssetPayload> {
    if kind.is_image() {
        let img = image::load_from_memory(bytes)
            .map_err(|e| anyhow::anyhow!("could not decode image {}: {}", url, e))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(AssetPayload::Image {
            width,
            height,
            rgba: rgba.into_raw(),
        })
    } else {
        Ok(AssetPayload::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        ))
    }
}
