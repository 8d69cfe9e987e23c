//! Capability interfaces for the collaborators the engine drives.
//!
//! The engine only ever talks to a browser, a scratch store for captured
//! images, a document writer and a sync destination through these traits.
//! `chrome`, `artifact`, `pdf` and `sync` provide the production adapters;
//! tests plug in in-memory fakes.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, warn};

/// Rendered size of a content node, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

/// One browser tab: a live rendered document plus the node query API.
pub trait Renderer {
    /// Handle to a node inside the rendered document.
    type Node;

    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Block until the document reports it has finished loading.
    ///
    /// Returns `false` when the renderer has no readiness signal; callers then
    /// fall back to a bounded settle pause.
    fn wait_until_ready(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn query_node(&mut self, selector: &str, scope: Option<&Self::Node>)
    -> Result<Option<Self::Node>>;

    fn query_all(&mut self, selector: &str, scope: Option<&Self::Node>) -> Result<Vec<Self::Node>>;

    /// Element children of `node`, in document order.
    fn children(&mut self, node: &Self::Node) -> Result<Vec<Self::Node>>;

    fn geometry(&mut self, node: &Self::Node) -> Result<Geometry>;

    /// Rendered text of `node` (`innerText`).
    fn text(&mut self, node: &Self::Node) -> Result<String>;

    fn attribute(&mut self, node: &Self::Node, name: &str) -> Result<Option<String>>;

    fn scroll_by(&mut self, distance: u32) -> Result<()>;

    /// Total scrollable height of the document.
    fn scroll_extent(&mut self) -> Result<u32>;

    /// Rasterize exactly the bounds of `node`; returns PNG bytes.
    fn capture(&mut self, node: &Self::Node) -> Result<Vec<u8>>;

    /// Click-equivalent activation of `node`.
    fn invoke(&mut self, node: &Self::Node) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Source of fresh tabs.
pub trait Browser {
    type Tab: Renderer;

    fn open_tab(&mut self) -> Result<Self::Tab>;
}

/// Handle to one stored capture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactRef {
    pub path: PathBuf,
}

/// Scratch storage for captured images.
pub trait ArtifactStore {
    fn put(&mut self, png: &[u8]) -> Result<ArtifactRef>;

    fn delete(&mut self, artifact: &ArtifactRef) -> Result<()>;
}

/// Output page dimensions handed to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBudget {
    pub width: u32,
    pub height: u32,
}

/// Box an image is scaled into (aspect preserved, centered horizontally).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitBox {
    pub width: u32,
    pub height: u32,
}

/// Writer for one output document per article.
pub trait DocumentAssembler {
    type Doc;

    fn open(&mut self, name: &str, author: &str) -> Result<Self::Doc>;

    fn append_page(&mut self, doc: &mut Self::Doc, budget: PageBudget) -> Result<()>;

    fn place_image(&mut self, doc: &mut Self::Doc, artifact: &ArtifactRef, fit: FitBox)
    -> Result<()>;

    /// Write the document out and return where it landed.
    fn finalize(&mut self, doc: Self::Doc) -> Result<PathBuf>;
}

/// Removable destination for finished documents.
pub trait SyncTarget {
    fn is_present(&self) -> bool;

    /// Directory the documents are copied into.
    fn destination(&self) -> PathBuf;

    /// Copy every file in `source_dir` into `dest_dir`; returns the file count.
    fn copy(&self, source_dir: &Path, dest_dir: &Path) -> Result<usize>;
}

/// Owns a tab and closes it when dropped, whichever way the item ends.
pub struct TabGuard<R: Renderer> {
    tab: R,
    label: String,
}

impl<R: Renderer> TabGuard<R> {
    pub fn new(tab: R, label: impl Into<String>) -> Self {
        Self {
            tab,
            label: label.into(),
        }
    }
}

impl<R: Renderer> Deref for TabGuard<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.tab
    }
}

impl<R: Renderer> DerefMut for TabGuard<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.tab
    }
}

impl<R: Renderer> Drop for TabGuard<R> {
    fn drop(&mut self) {
        match self.tab.close() {
            Ok(()) => debug!("tab: closed {}", self.label),
            Err(e) => warn!("tab: failed to close {}: {e:#}", self.label),
        }
    }
}
