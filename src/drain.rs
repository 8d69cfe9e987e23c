//! Queue drain controller.
//!
//! The queue is a live list that shrinks (and may reorder) as items get
//! archived, so nothing is indexed across cycles: every cycle re-queries the
//! list and takes the first entry whose identity has not been given up on.
//!
//! ```text
//! Idle -> Fetching -> Processing -> Archiving -> Requerying -> Fetching ...
//!            |             |                          ^
//!            |             +-- item failed -----------+
//!            +-- head already archived -> Archiving
//!            +-- no eligible head -> Done
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use log::{debug, info, warn};

use crate::article::{Article, ArticleSummary, normalize_href};
use crate::cancel::CancelToken;
use crate::capability::{ArtifactStore, Browser, DocumentAssembler, Renderer, TabGuard};
use crate::config::{CaptureConfig, PacingConfig, SourceConfig};
use crate::error::ArchiveError;
use crate::pipeline::{process_article, settle};
use crate::segment::DecomposeSettings;
use crate::stabilize::{PollSettings, wait_until_stable};

/// Everything the engine needs for one run.
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub capture: CaptureConfig,
    pub source: SourceConfig,
    pub min_segment_width: u32,
    pub max_depth: usize,
    pub poll: PollSettings,
    pub pacing: PacingConfig,
    /// Archive invocations per identity before it is reported as stuck.
    pub max_archive_attempts: u32,
}

impl ArchiveSettings {
    pub fn decompose(&self) -> DecomposeSettings {
        DecomposeSettings {
            max_segment_height: self.capture.height,
            min_width: self.min_segment_width,
            max_depth: self.max_depth,
        }
    }
}

/// An item that was given up on, and why.
#[derive(Debug)]
pub struct SkippedArticle {
    pub article: Article,
    pub error: ArchiveError,
}

/// Outcome of one drain.
///
/// The two lists can overlap: an article whose document was written but which
/// could not be taken off the queue (stuck, or its archive control failed) is
/// in `archived` and also in `skipped`.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Articles with a written document, in processing order.
    pub archived: Vec<ArticleSummary>,
    pub skipped: Vec<SkippedArticle>,
}

#[derive(Debug)]
enum DrainState {
    Idle,
    Fetching,
    Processing(Article),
    Archiving(Article),
    Requerying,
    Done,
}

struct Drain<'a, R: Renderer> {
    queue: &'a mut R,
    settings: &'a ArchiveSettings,
    /// Archive invocations per identity; present once an item was processed.
    attempts: HashMap<String, u32>,
    abandoned: HashSet<String>,
    report: DrainReport,
}

/// Drain the reading queue: capture every article into a document and archive
/// it, until no eligible item is left.
///
/// Item-level failures, including a failed archive action, are collected in
/// [`DrainReport::skipped`]. The run itself fails only when the queue cannot
/// be loaded or listed, or on cancellation.
pub fn archive_queue<B, S, A>(
    browser: &mut B,
    store: &mut S,
    assembler: &mut A,
    settings: &ArchiveSettings,
    cancel: &CancelToken,
) -> Result<DrainReport, ArchiveError>
where
    B: Browser,
    S: ArtifactStore,
    A: DocumentAssembler,
{
    let start = Instant::now();
    let mut queue = open_queue(browser, settings, cancel)?;

    let mut drain = Drain {
        queue: &mut *queue,
        settings,
        attempts: HashMap::new(),
        abandoned: HashSet::new(),
        report: DrainReport::default(),
    };

    let mut state = DrainState::Idle;
    loop {
        cancel.check()?;
        debug!("drain: {state:?}");
        state = match state {
            DrainState::Idle => DrainState::Fetching,
            DrainState::Fetching => drain.fetch()?,
            DrainState::Processing(article) => {
                match process_article(browser, store, assembler, &article, settings, cancel) {
                    Ok(summary) => {
                        info!(
                            "drain: archived '{}' -> {}",
                            summary.title,
                            summary.document.display()
                        );
                        drain.attempts.insert(article.href.clone(), 0);
                        drain.report.archived.push(summary);
                        DrainState::Archiving(article)
                    }
                    Err(e) if e.aborts_run() => return Err(e),
                    Err(e) => {
                        drain.abandon(article, e);
                        DrainState::Requerying
                    }
                }
            }
            DrainState::Archiving(article) => match drain.archive(&article) {
                Ok(()) => DrainState::Requerying,
                Err(e) if e.aborts_run() => return Err(e),
                Err(e) => {
                    drain.abandon(article, e);
                    DrainState::Requerying
                }
            },
            DrainState::Requerying => {
                cancel.sleep(settings.pacing.archive_settle)?;
                DrainState::Fetching
            }
            DrainState::Done => break,
        };
    }

    let report = drain.report;
    info!(
        "drain: completed in {:.1}s ({} archived, {} skipped)",
        start.elapsed().as_secs_f64(),
        report.archived.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Read the queue without processing anything.
pub fn list_queue<B: Browser>(
    browser: &mut B,
    settings: &ArchiveSettings,
    cancel: &CancelToken,
) -> Result<Vec<Article>, ArchiveError> {
    let mut queue = open_queue(browser, settings, cancel)?;
    let items = queue
        .query_all(&settings.source.item_selector, None)
        .map_err(ArchiveError::renderer("query queue items"))?;
    let mut articles = Vec::with_capacity(items.len());
    for item in &items {
        if let Some(article) = read_item(&mut *queue, item, &settings.source)? {
            articles.push(article);
        }
    }
    info!("drain: {} item(s) queued", articles.len());
    Ok(articles)
}

fn open_queue<B: Browser>(
    browser: &mut B,
    settings: &ArchiveSettings,
    cancel: &CancelToken,
) -> Result<TabGuard<B::Tab>, ArchiveError> {
    let queue = browser
        .open_tab()
        .map_err(ArchiveError::renderer("open queue tab"))?;
    let mut queue = TabGuard::new(queue, "queue");
    let url = &settings.source.queue_url;
    info!("drain: loading queue {url}");
    queue
        .navigate(url)
        .map_err(|source| ArchiveError::NavigationFailure {
            href: url.clone(),
            source,
        })?;
    settle(&mut *queue, settings.pacing.load_settle, cancel)?;
    wait_until_stable(&mut *queue, &settings.poll, cancel)?;
    Ok(queue)
}

/// Extract `{title, author, href}` from one queue entry.
///
/// Entries without a link are not articles and yield `None`.
fn read_item<R: Renderer>(
    view: &mut R,
    item: &R::Node,
    source: &SourceConfig,
) -> Result<Option<Article>, ArchiveError> {
    let Some(href) = item_href(view, item, source)? else {
        return Ok(None);
    };
    let link = view
        .query_node(&source.link_selector, Some(item))
        .map_err(ArchiveError::renderer("query link"))?;
    let title = match link {
        Some(link) => match view
            .query_node(&source.title_selector, Some(&link))
            .map_err(ArchiveError::renderer("query title"))?
        {
            Some(title) => view.text(&title),
            None => view.text(&link),
        }
        .map_err(ArchiveError::renderer("read title"))?,
        None => String::new(),
    };
    let author = match view
        .query_node(&source.author_selector, Some(item))
        .map_err(ArchiveError::renderer("query author"))?
    {
        Some(node) => view
            .text(&node)
            .map_err(ArchiveError::renderer("read author"))?,
        None => String::new(),
    };
    Ok(Some(Article {
        title: title.trim().to_string(),
        author: author.trim().to_string(),
        href,
    }))
}

/// Normalized link target of a queue entry, i.e. its identity.
fn item_href<R: Renderer>(
    view: &mut R,
    item: &R::Node,
    source: &SourceConfig,
) -> Result<Option<String>, ArchiveError> {
    let Some(link) = view
        .query_node(&source.link_selector, Some(item))
        .map_err(ArchiveError::renderer("query link"))?
    else {
        return Ok(None);
    };
    let href = view
        .attribute(&link, "href")
        .map_err(ArchiveError::renderer("read href"))?;
    Ok(href
        .filter(|h| !h.trim().is_empty())
        .map(|h| normalize_href(h.trim(), &source.queue_url)))
}

impl<R: Renderer> Drain<'_, R> {
    fn fetch(&mut self) -> Result<DrainState, ArchiveError> {
        let settings = self.settings;
        let source = &settings.source;
        let items = self
            .queue
            .query_all(&source.item_selector, None)
            .map_err(ArchiveError::renderer("query queue items"))?;

        for item in &items {
            let href = match item_href(&mut *self.queue, item, source) {
                Ok(Some(href)) => href,
                Ok(None) => continue,
                Err(e) => {
                    warn!("drain: unreadable queue entry: {}", e.chain());
                    continue;
                }
            };
            if self.abandoned.contains(&href) {
                continue;
            }
            let article = match read_item(&mut *self.queue, item, source) {
                Ok(Some(article)) => article,
                Ok(None) => continue,
                Err(e) => {
                    let article = Article {
                        title: String::new(),
                        author: String::new(),
                        href,
                    };
                    self.abandon(article, e);
                    continue;
                }
            };
            let seen = self.attempts.get(&href).copied();
            return Ok(match seen {
                Some(attempts) if attempts >= settings.max_archive_attempts => {
                    warn!("drain: {href} did not leave the queue after {attempts} archive attempts");
                    self.abandon(article, ArchiveError::StuckItem { href, attempts });
                    // The list itself is unchanged; look at the next entry.
                    DrainState::Fetching
                }
                Some(attempts) => {
                    debug!("drain: {href} still queued after {attempts} attempt(s), archiving again");
                    DrainState::Archiving(article)
                }
                None => DrainState::Processing(article),
            });
        }
        info!("drain: queue is empty ({} item(s) on page)", items.len());
        Ok(DrainState::Done)
    }

    /// Invoke the archive control of the entry whose identity is `article.href`.
    fn archive(&mut self, article: &Article) -> Result<(), ArchiveError> {
        let source = &self.settings.source;
        let attempts = self.attempts.entry(article.href.clone()).or_insert(0);
        *attempts += 1;
        let attempt = *attempts;

        let items = self
            .queue
            .query_all(&source.item_selector, None)
            .map_err(ArchiveError::renderer("query queue items"))?;
        let mut entry = None;
        for item in items {
            if item_href(&mut *self.queue, &item, source)?.as_deref() == Some(article.href.as_str()) {
                entry = Some(item);
                break;
            }
        }
        let Some(entry) = entry else {
            debug!("drain: {} already left the queue", article.href);
            return Ok(());
        };

        let candidates = self
            .queue
            .query_all(&source.archive_selector, Some(&entry))
            .map_err(ArchiveError::renderer("query archive control"))?;
        for control in &candidates {
            let text = self
                .queue
                .text(control)
                .map_err(ArchiveError::renderer("read archive control"))?;
            if text.contains(source.archive_label.as_str()) {
                self.queue
                    .invoke(control)
                    .map_err(ArchiveError::renderer("invoke archive control"))?;
                info!("drain: archive requested for {} (attempt {attempt})", article.href);
                return Ok(());
            }
        }
        warn!(
            "drain: no '{}' control among {} candidate(s) for {}",
            source.archive_label,
            candidates.len(),
            article.href
        );
        Ok(())
    }

    fn abandon(&mut self, article: Article, error: ArchiveError) {
        warn!(
            "drain: skipping '{}' ({}): {}",
            article.title,
            article.href,
            error.chain()
        );
        self.abandoned.insert(article.href.clone());
        self.report.skipped.push(SkippedArticle { article, error });
    }
}
