//! Asset transport: where the bytes actually come from.
//!
//! The loader never touches the filesystem or network itself. It hands each
//! request to an [`AssetSource`] together with a completion sender; the source
//! delivers raw bytes (or an error) through the channel whenever it pleases.
//! Completions are drained cooperatively on the driving thread, so no order
//! may be assumed and nothing blocks.

use std::path::PathBuf;

use futures::channel::mpsc::UnboundedSender;

/// Raw fetch result delivered back through the completion channel.
#[derive(Debug)]
pub struct FetchCompletion {
    pub name: String,
    pub result: anyhow::Result<Vec<u8>>,
}

pub type CompletionSender = UnboundedSender<FetchCompletion>;

/// A byte transport for named assets.
///
/// `fetch` must not block the caller beyond initiating the request; the
/// completion may be sent immediately or on any later `poll`. Once issued a
/// request runs to completion or failure: there is no cancellation and no
/// timeout.
pub trait AssetSource {
    fn fetch(&mut self, name: &str, url: &str, reply: CompletionSender);
}

/// Disk-backed source resolving URLs relative to an asset root directory.
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for FileSource {
    fn fetch(&mut self, name: &str, url: &str, reply: CompletionSender) {
        let path = self.root.join(url);
        let result = std::fs::read(&path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e));
        // A dropped receiver just means the loader went away first.
        let _ = reply.unbounded_send(FetchCompletion {
            name: name.to_string(),
            result,
        });
    }
}
