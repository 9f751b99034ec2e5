//! Fatal, startup-time errors. Non-fatal parse problems (malformed scene
//! lines, unknown commands) are logged and skipped rather than surfaced
//! here — see `parser.rs`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MuonError {
    #[error("scene file not found: {0}")]
    SceneNotFound(PathBuf),

    #[error("scene file unreadable: {0}: {1}")]
    SceneUnreadable(PathBuf, std::io::Error),

    #[error("failed to write output image {0}: {1}")]
    OutputWriteFailed(PathBuf, image::ImageError),
}
