//! Scriptable browser, store and assembler shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, bail};
use base64::Engine;

use queuepress::cancel::CancelToken;
use queuepress::capability::{
    ArtifactRef, ArtifactStore, Browser, DocumentAssembler, FitBox, Geometry, PageBudget,
    Renderer,
};
use queuepress::config::ConfigFile;
use queuepress::drain::ArchiveSettings;

#[path = "../../src/fake/store.rs"]
mod store;

pub use store::MemoryStore;

pub const QUEUE_URL: &str = "https://medium.com/me/list/queue";

const PIXEL_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// A valid 1x1 PNG, standing in for every capture.
pub fn pixel_png() -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(PIXEL_PNG)
        .unwrap()
}

/// Default settings with every pause set to zero.
pub fn settings() -> ArchiveSettings {
    let mut settings = ConfigFile::default().resolve().archive;
    settings.poll.interval = Duration::ZERO;
    settings.pacing.load_settle = Duration::ZERO;
    settings.pacing.archive_settle = Duration::ZERO;
    settings
}

/// Content tree of an article page.
#[derive(Debug, Clone)]
pub struct Tree {
    pub width: u32,
    pub height: u32,
    pub children: Vec<Tree>,
}

impl Tree {
    pub fn leaf(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            children: Vec::new(),
        }
    }

    pub fn node(width: u32, height: u32, children: Vec<Tree>) -> Self {
        Self {
            width,
            height,
            children,
        }
    }

    /// A typical article body: three paragraphs and a tall figure.
    pub fn article() -> Self {
        Self::node(
            800,
            2100,
            vec![
                Self::leaf(800, 400),
                Self::leaf(800, 400),
                Self::leaf(800, 400),
                Self::leaf(800, 900),
            ],
        )
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    /// `href` exactly as it appears in the queue markup.
    pub raw_href: String,
    pub title: String,
    pub author: String,
    /// Archiving has no effect on this entry.
    pub sticky: bool,
}

impl Entry {
    pub fn new(raw_href: &str, title: &str) -> Self {
        Self {
            raw_href: raw_href.to_string(),
            title: title.to_string(),
            author: format!("{title} Author"),
            sticky: false,
        }
    }

    pub fn sticky(mut self) -> Self {
        self.sticky = true;
        self
    }
}

/// Rewrites the queue in response to an event on the given URL or raw href.
pub type QueueScript = Box<dyn FnMut(&str, &mut Vec<Entry>)>;

/// Everything the fake browser knows and records.
#[derive(Default)]
pub struct State {
    pub queue: Vec<Entry>,
    /// Article trees keyed by absolute URL.
    pub articles: HashMap<String, Tree>,
    pub unreachable: HashSet<String>,
    pub navigations: Vec<String>,
    /// Raw hrefs whose archive control was clicked, in order.
    pub archive_clicks: Vec<String>,
    pub open_tabs: i32,
    /// Cancel this token when navigating to the given URL.
    pub cancel_on: Option<(String, CancelToken)>,
    /// Raw hrefs whose archive control errors out as if it were detached.
    pub detached_controls: HashSet<String>,
    /// Runs after every navigation, e.g. the list re-rendering meanwhile.
    pub on_navigate: Option<QueueScript>,
    /// Runs after every successful archive click.
    pub on_archive: Option<QueueScript>,
}

fn run_script(script: &mut Option<QueueScript>, key: &str, queue: &mut Vec<Entry>) {
    if let Some(script) = script.as_mut() {
        script(key, queue);
    }
}

#[derive(Clone, Default)]
pub struct FakeBrowser {
    pub state: Rc<RefCell<State>>,
}

impl FakeBrowser {
    pub fn new(queue: Vec<Entry>) -> Self {
        let browser = Self::default();
        browser.state.borrow_mut().queue = queue;
        browser
    }

    pub fn article(self, url: &str, tree: Tree) -> Self {
        self.state.borrow_mut().articles.insert(url.to_string(), tree);
        self
    }

    pub fn unreachable(self, url: &str) -> Self {
        self.state.borrow_mut().unreachable.insert(url.to_string());
        self
    }

    pub fn detached_control(self, raw_href: &str) -> Self {
        self.state
            .borrow_mut()
            .detached_controls
            .insert(raw_href.to_string());
        self
    }

    pub fn on_navigate(self, script: impl FnMut(&str, &mut Vec<Entry>) + 'static) -> Self {
        self.state.borrow_mut().on_navigate = Some(Box::new(script));
        self
    }

    pub fn on_archive(self, script: impl FnMut(&str, &mut Vec<Entry>) + 'static) -> Self {
        self.state.borrow_mut().on_archive = Some(Box::new(script));
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.borrow().navigations.clone()
    }

    pub fn archive_clicks(&self) -> Vec<String> {
        self.state.borrow().archive_clicks.clone()
    }

    pub fn open_tabs(&self) -> i32 {
        self.state.borrow().open_tabs
    }
}

impl Browser for FakeBrowser {
    type Tab = FakeTab;

    fn open_tab(&mut self) -> Result<FakeTab> {
        self.state.borrow_mut().open_tabs += 1;
        Ok(FakeTab {
            state: Rc::clone(&self.state),
            view: View::Blank,
            closed: false,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Item(String),
    Link(String),
    Title(String),
    Author(String),
    ArchiveControl(String),
    Content(usize),
}

struct FlatNode {
    geometry: Geometry,
    children: Vec<usize>,
}

enum View {
    Blank,
    Queue,
    Article(Vec<FlatNode>),
}

fn flatten(tree: &Tree, out: &mut Vec<FlatNode>) -> usize {
    let id = out.len();
    out.push(FlatNode {
        geometry: Geometry {
            width: tree.width,
            height: tree.height,
        },
        children: Vec::new(),
    });
    let children = tree.children.iter().map(|c| flatten(c, out)).collect();
    out[id].children = children;
    id
}

pub struct FakeTab {
    state: Rc<RefCell<State>>,
    view: View,
    closed: bool,
}

impl FakeTab {
    fn entry(&self, raw_href: &str) -> Result<Entry> {
        match self
            .state
            .borrow()
            .queue
            .iter()
            .find(|e| e.raw_href == raw_href)
        {
            Some(e) => Ok(e.clone()),
            None => bail!("stale queue element {raw_href}"),
        }
    }

    fn nodes(&self) -> Result<&[FlatNode]> {
        match &self.view {
            View::Article(nodes) => Ok(nodes),
            _ => bail!("not an article page"),
        }
    }
}

impl Renderer for FakeTab {
    type Node = Node;

    fn navigate(&mut self, url: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        state.navigations.push(url.to_string());
        run_script(&mut state.on_navigate, url, &mut state.queue);
        if let Some((target, token)) = &state.cancel_on
            && target == url
        {
            token.cancel();
        }
        if state.unreachable.contains(url) {
            bail!("net::ERR_CONNECTION_REFUSED");
        }
        self.view = if url == QUEUE_URL {
            View::Queue
        } else {
            let mut nodes = Vec::new();
            if let Some(tree) = state.articles.get(url) {
                flatten(tree, &mut nodes);
            }
            View::Article(nodes)
        };
        Ok(())
    }

    fn query_node(&mut self, selector: &str, scope: Option<&Node>) -> Result<Option<Node>> {
        Ok(match (scope, &self.view) {
            (None, View::Article(nodes)) => (!nodes.is_empty()).then_some(Node::Content(0)),
            (Some(Node::Item(h)), _) if selector == "a" => Some(Node::Link(h.clone())),
            (Some(Node::Item(h)), _) => Some(Node::Author(h.clone())),
            (Some(Node::Link(h)), _) => Some(Node::Title(h.clone())),
            _ => None,
        })
    }

    fn query_all(&mut self, _selector: &str, scope: Option<&Node>) -> Result<Vec<Node>> {
        Ok(match (scope, &self.view) {
            (None, View::Queue) => self
                .state
                .borrow()
                .queue
                .iter()
                .map(|e| Node::Item(e.raw_href.clone()))
                .collect(),
            // The author line and the archive button share a selector.
            (Some(Node::Item(h)), _) => {
                vec![Node::Author(h.clone()), Node::ArchiveControl(h.clone())]
            }
            _ => Vec::new(),
        })
    }

    fn children(&mut self, node: &Node) -> Result<Vec<Node>> {
        match node {
            Node::Content(id) => Ok(self.nodes()?[*id]
                .children
                .iter()
                .map(|&c| Node::Content(c))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn geometry(&mut self, node: &Node) -> Result<Geometry> {
        match node {
            Node::Content(id) => Ok(self.nodes()?[*id].geometry),
            other => bail!("no geometry for {other:?}"),
        }
    }

    fn text(&mut self, node: &Node) -> Result<String> {
        Ok(match node {
            Node::Title(h) | Node::Link(h) => self.entry(h)?.title,
            Node::Author(h) => self.entry(h)?.author,
            Node::ArchiveControl(_) => "Archive".to_string(),
            _ => String::new(),
        })
    }

    fn attribute(&mut self, node: &Node, name: &str) -> Result<Option<String>> {
        Ok(match node {
            Node::Link(h) if name == "href" => Some(h.clone()),
            _ => None,
        })
    }

    fn scroll_by(&mut self, _distance: u32) -> Result<()> {
        Ok(())
    }

    fn scroll_extent(&mut self) -> Result<u32> {
        Ok(0)
    }

    fn capture(&mut self, node: &Node) -> Result<Vec<u8>> {
        match node {
            Node::Content(_) => Ok(pixel_png()),
            other => bail!("cannot capture {other:?}"),
        }
    }

    fn invoke(&mut self, node: &Node) -> Result<()> {
        let Node::ArchiveControl(h) = node else {
            bail!("{node:?} is not clickable");
        };
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        if state.detached_controls.contains(h) {
            bail!("node is detached from the document");
        }
        state.archive_clicks.push(h.clone());
        state.queue.retain(|e| &e.raw_href != h || e.sticky);
        run_script(&mut state.on_archive, h, &mut state.queue);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.borrow_mut().open_tabs -= 1;
        }
        Ok(())
    }
}

pub struct RecordedDoc {
    pub name: String,
    pub author: String,
    pub pages: Vec<Vec<FitBox>>,
}

/// Assembler that records document layouts; fails for names in `fail_for`.
#[derive(Default)]
pub struct RecordingAssembler {
    pub fail_for: HashSet<String>,
    pub documents: Vec<RecordedDoc>,
}

impl DocumentAssembler for RecordingAssembler {
    type Doc = RecordedDoc;

    fn open(&mut self, name: &str, author: &str) -> Result<RecordedDoc> {
        Ok(RecordedDoc {
            name: name.to_string(),
            author: author.to_string(),
            pages: Vec::new(),
        })
    }

    fn append_page(&mut self, doc: &mut RecordedDoc, _budget: PageBudget) -> Result<()> {
        doc.pages.push(Vec::new());
        Ok(())
    }

    fn place_image(&mut self, doc: &mut RecordedDoc, _artifact: &ArtifactRef, fit: FitBox) -> Result<()> {
        match doc.pages.last_mut() {
            Some(page) => page.push(fit),
            None => bail!("image placed before the first page"),
        }
        Ok(())
    }

    fn finalize(&mut self, doc: RecordedDoc) -> Result<PathBuf> {
        if self.fail_for.contains(&doc.name) {
            bail!("no space left on device");
        }
        let path = PathBuf::from(format!("out/{}.pdf", doc.name));
        self.documents.push(doc);
        Ok(path)
    }
}
