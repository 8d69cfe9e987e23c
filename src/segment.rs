//! Segment decomposition: split a rendered content tree into captures that
//! each fit on one output page.
//!
//! A node that fits is captured whole (its children are never inspected); a
//! node that is too tall contributes nothing itself and is replaced by its
//! children, recursively. Invisible and decorative nodes (zero height or
//! narrower than `min_width`) are dropped with their subtree.

use std::time::Instant;

use log::{debug, info, trace, warn};

use crate::artifact::CaptureSession;
use crate::cancel::CancelToken;
use crate::capability::{ArtifactRef, ArtifactStore, Renderer};
use crate::error::ArchiveError;

#[derive(Debug, Clone)]
pub struct DecomposeSettings {
    /// Tallest node captured as one image (the page height).
    pub max_segment_height: u32,
    /// Nodes narrower than this are treated as decoration.
    pub min_width: u32,
    /// Recursion ceiling for pathological wrapper chains.
    pub max_depth: usize,
}

/// One captured piece of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub artifact: ArtifactRef,
    pub height: u32,
}

#[derive(Default)]
struct Stats {
    captured: u32,
    degenerate: u32,
    capture_failures: u32,
    lost_tall_leaves: u32,
}

struct Decomposer<'a, 's, R: Renderer, S: ArtifactStore> {
    view: &'a mut R,
    session: &'a mut CaptureSession<'s, S>,
    settings: &'a DecomposeSettings,
    cancel: &'a CancelToken,
    out: Vec<Segment>,
    stats: Stats,
}

/// Decompose `root` into segments in document order.
///
/// Captures are stored through `session`, which owns them from here on.
/// A failed capture of one node is logged and skipped; running past
/// `max_depth` fails the whole decomposition.
pub fn decompose<R: Renderer, S: ArtifactStore>(
    view: &mut R,
    root: &R::Node,
    session: &mut CaptureSession<'_, S>,
    settings: &DecomposeSettings,
    cancel: &CancelToken,
) -> Result<Vec<Segment>, ArchiveError> {
    let start = Instant::now();
    let mut decomposer = Decomposer {
        view,
        session,
        settings,
        cancel,
        out: Vec::new(),
        stats: Stats::default(),
    };
    decomposer.visit(root, 0)?;

    let Decomposer { out, stats, .. } = decomposer;
    info!(
        "segment: decompose completed in {:.1}ms ({} segments, {} degenerate, {} capture failures, {} uncapturable)",
        start.elapsed().as_secs_f64() * 1000.0,
        stats.captured,
        stats.degenerate,
        stats.capture_failures,
        stats.lost_tall_leaves
    );
    Ok(out)
}

impl<R: Renderer, S: ArtifactStore> Decomposer<'_, '_, R, S> {
    fn visit(&mut self, node: &R::Node, depth: usize) -> Result<(), ArchiveError> {
        self.cancel.check()?;
        if depth > self.settings.max_depth {
            return Err(ArchiveError::DecompositionTooDeep {
                limit: self.settings.max_depth,
            });
        }

        let geometry = match self.view.geometry(node) {
            Ok(g) => g,
            Err(e) => {
                self.capture_failed(depth, ArchiveError::CaptureFailure { source: e });
                return Ok(());
            }
        };
        trace!(
            "segment: depth {depth}, {}x{}px",
            geometry.width, geometry.height
        );

        if geometry.height == 0 || geometry.width < self.settings.min_width {
            self.stats.degenerate += 1;
            return Ok(());
        }

        if geometry.height <= self.settings.max_segment_height {
            match self.capture(node) {
                Ok(artifact) => {
                    self.stats.captured += 1;
                    self.out.push(Segment {
                        artifact,
                        height: geometry.height,
                    });
                }
                Err(e) => self.capture_failed(depth, e),
            }
            return Ok(());
        }

        let children = match self.view.children(node) {
            Ok(c) => c,
            Err(e) => {
                self.capture_failed(depth, ArchiveError::CaptureFailure { source: e });
                return Ok(());
            }
        };
        if children.is_empty() {
            // Too tall to capture and nothing to split into. Content is lost.
            self.stats.lost_tall_leaves += 1;
            warn!(
                "segment: dropping {}px node at depth {depth}: taller than {}px and has no children",
                geometry.height, self.settings.max_segment_height
            );
            return Ok(());
        }
        debug!(
            "segment: splitting {}px node at depth {depth} into {} children",
            geometry.height,
            children.len()
        );
        for child in &children {
            self.visit(child, depth + 1)?;
        }
        Ok(())
    }

    fn capture(&mut self, node: &R::Node) -> Result<ArtifactRef, ArchiveError> {
        let png = self
            .view
            .capture(node)
            .map_err(|source| ArchiveError::CaptureFailure { source })?;
        self.session
            .record(&png)
            .map_err(|source| ArchiveError::CaptureFailure { source })
    }

    fn capture_failed(&mut self, depth: usize, err: ArchiveError) {
        self.stats.capture_failures += 1;
        warn!(
            "segment: skipping node at depth {depth}: {:#}",
            anyhow::Error::new(err)
        );
    }
}
