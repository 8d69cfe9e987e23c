//! Failure taxonomy for the capture / pack / drain engine.
//!
//! Whether a variant ends the whole run or only the current article is decided
//! by the drain controller, not here: the same `StabilizationTimeout` is fatal
//! on the queue view and merely skips an article on an article page.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("view did not stabilize after {steps} scroll steps (extent {extent}px)")]
    StabilizationTimeout { steps: u32, extent: u32 },

    #[error("content tree is deeper than {limit} levels")]
    DecompositionTooDeep { limit: usize },

    #[error("no capturable content")]
    EmptyContent,

    #[error("capture failed")]
    CaptureFailure {
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to load {href}")]
    NavigationFailure {
        href: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{href} is still queued after {attempts} archive attempts")]
    StuckItem { href: String, attempts: u32 },

    #[error("failed to assemble document '{name}'")]
    AssemblyFailure {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("sync target {} is not present", path.display())]
    SyncUnavailable { path: PathBuf },

    #[error("renderer failed to {action}")]
    Renderer {
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

impl ArchiveError {
    /// Wrap a renderer error with the action that was being attempted.
    pub fn renderer(action: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| ArchiveError::Renderer { action, source }
    }

    /// Errors that must stop the drain even when raised while processing a
    /// single article.
    pub fn aborts_run(&self) -> bool {
        matches!(self, ArchiveError::Cancelled)
    }

    /// The message followed by every source, joined with `: `.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(e) = source {
            out.push_str(": ");
            out.push_str(&e.to_string());
            source = e.source();
        }
        out
    }
}
