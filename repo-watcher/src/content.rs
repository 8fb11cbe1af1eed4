//! Reading and decoding tracked file content.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

/// Reads a tracked file and decodes it into an opaque payload.
///
/// Returning `None` is an expected outcome for missing, malformed or binary
/// files and must not be treated as a failure by callers.
#[async_trait]
pub trait ContentReader: Send + Sync {
    async fn read_decoded(&self, path: &Path) -> Option<serde_json::Value>;
}

/// Decodes the tracked file as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContentReader;

#[async_trait]
impl ContentReader for JsonContentReader {
    async fn read_decoded(&self, path: &Path) -> Option<serde_json::Value> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Could not read {}: {e}", path.display());
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Could not decode {}: {e}", path.display());
                None
            }
        }
    }
}
