//! In-memory collaborators for unit tests.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Result, bail};

use crate::capability::{
    ArtifactRef, ArtifactStore, Browser, DocumentAssembler, FitBox, Geometry, PageBudget,
    Renderer,
};

mod store;

pub use store::MemoryStore;

/// Content tree description, flattened into a [`FakeTab`].
#[derive(Debug, Clone)]
pub struct Tree {
    width: u32,
    height: u32,
    children: Vec<Tree>,
    fail_capture: bool,
}

impl Tree {
    pub fn leaf(width: u32, height: u32) -> Self {
        Self::node(width, height, Vec::new())
    }

    pub fn node(width: u32, height: u32, children: Vec<Tree>) -> Self {
        Self {
            width,
            height,
            children,
            fail_capture: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_capture = true;
        self
    }
}

struct FlatNode {
    geometry: Geometry,
    children: Vec<usize>,
    fail_capture: bool,
}

/// A tab whose nodes are preorder indices into a flattened [`Tree`].
#[derive(Default)]
pub struct FakeTab {
    nodes: Vec<FlatNode>,
    extent: u32,
    growth: u32,
    grow_limit: Option<u32>,
    grows: u32,
    pub scrolled: u64,
    pub captured: Vec<usize>,
    closes: Rc<Cell<u32>>,
}

impl FakeTab {
    pub fn with_tree(tree: Tree) -> Self {
        let mut tab = Self::default();
        tab.flatten(&tree);
        tab
    }

    /// Scrollable view of `extent` px that grows by `growth` px per scroll.
    pub fn with_extent(extent: u32, growth: u32) -> Self {
        Self {
            extent,
            growth,
            ..Self::default()
        }
    }

    pub fn grow_limit(mut self, limit: u32) -> Self {
        self.grow_limit = Some(limit);
        self
    }

    pub fn root(&self) -> usize {
        0
    }

    fn flatten(&mut self, tree: &Tree) -> usize {
        let id = self.nodes.len();
        self.nodes.push(FlatNode {
            geometry: Geometry {
                width: tree.width,
                height: tree.height,
            },
            children: Vec::new(),
            fail_capture: tree.fail_capture,
        });
        let children: Vec<usize> = tree.children.iter().map(|c| self.flatten(c)).collect();
        self.nodes[id].children = children;
        id
    }
}

impl Renderer for FakeTab {
    type Node = usize;

    fn navigate(&mut self, _url: &str) -> Result<()> {
        Ok(())
    }

    fn query_node(&mut self, _selector: &str, _scope: Option<&usize>) -> Result<Option<usize>> {
        Ok((!self.nodes.is_empty()).then_some(0))
    }

    fn query_all(&mut self, _selector: &str, _scope: Option<&usize>) -> Result<Vec<usize>> {
        Ok(Vec::new())
    }

    fn children(&mut self, node: &usize) -> Result<Vec<usize>> {
        Ok(self.nodes[*node].children.clone())
    }

    fn geometry(&mut self, node: &usize) -> Result<Geometry> {
        Ok(self.nodes[*node].geometry)
    }

    fn text(&mut self, _node: &usize) -> Result<String> {
        Ok(String::new())
    }

    fn attribute(&mut self, _node: &usize, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn scroll_by(&mut self, distance: u32) -> Result<()> {
        self.scrolled += u64::from(distance);
        if self.grow_limit.is_none_or(|limit| self.grows < limit) {
            self.extent += self.growth;
            self.grows += 1;
        }
        Ok(())
    }

    fn scroll_extent(&mut self) -> Result<u32> {
        Ok(self.extent)
    }

    fn capture(&mut self, node: &usize) -> Result<Vec<u8>> {
        if self.nodes[*node].fail_capture {
            bail!("node {node} detached during capture");
        }
        self.captured.push(*node);
        Ok(vec![*node as u8])
    }

    fn invoke(&mut self, _node: &usize) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closes.set(self.closes.get() + 1);
        Ok(())
    }
}

/// Hands out tabs showing the same tree and counts how many got closed.
#[derive(Default)]
pub struct FakeBrowser {
    tree: Option<Tree>,
    pub closes: Rc<Cell<u32>>,
}

impl FakeBrowser {
    pub fn with_tree(tree: Tree) -> Self {
        Self {
            tree: Some(tree),
            ..Self::default()
        }
    }
}

impl Browser for FakeBrowser {
    type Tab = FakeTab;

    fn open_tab(&mut self) -> Result<FakeTab> {
        let mut tab = match &self.tree {
            Some(tree) => FakeTab::with_tree(tree.clone()),
            None => FakeTab::default(),
        };
        tab.closes = Rc::clone(&self.closes);
        Ok(tab)
    }
}

/// `(name, author, fit boxes per page)`
pub type RecordedDoc = (String, String, Vec<Vec<FitBox>>);

/// Assembler that records the layout instead of writing anything.
#[derive(Default)]
pub struct RecordingAssembler {
    pub fail: bool,
    pub documents: Vec<RecordedDoc>,
}

impl DocumentAssembler for RecordingAssembler {
    type Doc = RecordedDoc;

    fn open(&mut self, name: &str, author: &str) -> Result<RecordedDoc> {
        Ok((name.to_string(), author.to_string(), Vec::new()))
    }

    fn append_page(&mut self, doc: &mut RecordedDoc, _budget: PageBudget) -> Result<()> {
        doc.2.push(Vec::new());
        Ok(())
    }

    fn place_image(&mut self, doc: &mut RecordedDoc, _artifact: &ArtifactRef, fit: FitBox) -> Result<()> {
        match doc.2.last_mut() {
            Some(page) => page.push(fit),
            None => bail!("image placed before the first page"),
        }
        Ok(())
    }

    fn finalize(&mut self, doc: RecordedDoc) -> Result<PathBuf> {
        if self.fail {
            bail!("disk full");
        }
        let path = PathBuf::from(format!("{}.pdf", doc.0));
        self.documents.push(doc);
        Ok(path)
    }
}
