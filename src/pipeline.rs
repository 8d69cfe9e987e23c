//! One article, start to finish: load, stabilize, decompose, pack, assemble.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::article::{Article, ArticleSummary, sanitize_filename};
use crate::artifact::CaptureSession;
use crate::cancel::CancelToken;
use crate::capability::{
    ArtifactStore, Browser, DocumentAssembler, FitBox, PageBudget, Renderer, TabGuard,
};
use crate::config::CaptureConfig;
use crate::drain::ArchiveSettings;
use crate::error::ArchiveError;
use crate::pack::{Page, pack};
use crate::segment::decompose;
use crate::stabilize::wait_until_stable;

/// Wait for `view` to finish loading, or sleep `fallback` if it cannot say.
pub(crate) fn settle<R: Renderer>(
    view: &mut R,
    fallback: Duration,
    cancel: &CancelToken,
) -> Result<(), ArchiveError> {
    if view
        .wait_until_ready()
        .map_err(ArchiveError::renderer("wait for page load"))?
    {
        return Ok(());
    }
    debug!("pipeline: no readiness signal, pausing {}ms", fallback.as_millis());
    cancel.sleep(fallback)
}

/// Capture `article` into a document.
///
/// The tab and every captured image are released before this returns,
/// whether it succeeds or not.
pub fn process_article<B, S, A>(
    browser: &mut B,
    store: &mut S,
    assembler: &mut A,
    article: &Article,
    settings: &ArchiveSettings,
    cancel: &CancelToken,
) -> Result<ArticleSummary, ArchiveError>
where
    B: Browser,
    S: ArtifactStore,
    A: DocumentAssembler,
{
    let start = Instant::now();
    cancel.check()?;

    let tab = browser
        .open_tab()
        .map_err(ArchiveError::renderer("open tab"))?;
    let mut tab = TabGuard::new(tab, article.href.as_str());

    tab.navigate(&article.href)
        .map_err(|source| ArchiveError::NavigationFailure {
            href: article.href.clone(),
            source,
        })?;
    settle(&mut *tab, settings.pacing.load_settle, cancel)?;
    wait_until_stable(&mut *tab, &settings.poll, cancel)?;

    let root = tab
        .query_node(&settings.source.content_selector, None)
        .map_err(ArchiveError::renderer("find content root"))?
        .ok_or(ArchiveError::EmptyContent)?;

    let mut session = CaptureSession::new(store);
    let segments = decompose(
        &mut *tab,
        &root,
        &mut session,
        &settings.decompose(),
        cancel,
    )?;
    let pages = pack(segments, settings.capture.height)?;

    let name = sanitize_filename(&article.title);
    let document = assemble(assembler, &name, &article.author, &pages, settings.capture)
        .map_err(|source| ArchiveError::AssemblyFailure {
            name: name.clone(),
            source,
        })?;

    info!(
        "pipeline: '{}' completed in {:.1}ms ({} pages, {} captures)",
        article.title,
        start.elapsed().as_secs_f64() * 1000.0,
        pages.len(),
        session.len()
    );
    Ok(ArticleSummary::new(article, document))
}

fn assemble<A: DocumentAssembler>(
    assembler: &mut A,
    name: &str,
    author: &str,
    pages: &[Page],
    capture: CaptureConfig,
) -> anyhow::Result<PathBuf> {
    let budget = PageBudget {
        width: capture.width,
        height: capture.height,
    };
    let mut doc = assembler.open(name, author)?;
    for page in pages {
        assembler.append_page(&mut doc, budget)?;
        for segment in &page.segments {
            // Never taller than the page.
            let fit = FitBox {
                width: budget.width,
                height: segment.height.min(budget.height),
            };
            assembler.place_image(&mut doc, &segment.artifact, fit)?;
        }
    }
    assembler.finalize(doc)
}
