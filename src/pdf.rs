//! PDF document assembly via Typst.
//!
//! Each article becomes one Typst source: fixed-size zero-margin pages, one
//! block-level image per segment, explicit breaks between packed pages. The
//! source is compiled against an [`ArchiveWorld`] that serves the captured
//! PNGs and exported with `typst-pdf`.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::capability::{ArtifactRef, DocumentAssembler, FitBox, PageBudget};
use crate::render::{compile_document, export_pdf};
use crate::world::{ArchiveWorld, FontCache};

/// A document being built. Markup accumulates until `finalize`.
pub struct TypstDoc {
    name: String,
    markup: String,
    images: Vec<(String, PathBuf)>,
    budget: Option<PageBudget>,
    pages: usize,
}

impl TypstDoc {
    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }
}

/// Writes `<output_dir>/<name>.pdf` per article.
///
/// Names are unique per assembler: a second document called `name` becomes
/// `name (2).pdf`, and so on.
pub struct TypstAssembler {
    output_dir: PathBuf,
    fonts: FontCache,
    /// Lowercased stems written so far (FAT volumes ignore case).
    written: HashSet<String>,
}

impl TypstAssembler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        Ok(Self {
            output_dir,
            fonts: FontCache::new(),
            written: HashSet::new(),
        })
    }

    fn claim_name(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut n = 1;
        while !self.written.insert(candidate.to_lowercase()) {
            n += 1;
            candidate = format!("{name} ({n})");
        }
        if n > 1 {
            debug!("pdf: '{name}' already written, using '{candidate}'");
        }
        candidate
    }
}

/// Quote `s` as a Typst string literal.
fn typst_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' | '\r' | '\t' => out.push(' '),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl DocumentAssembler for TypstAssembler {
    type Doc = TypstDoc;

    fn open(&mut self, name: &str, author: &str) -> Result<TypstDoc> {
        let mut markup = String::new();
        writeln!(
            markup,
            "#set document(title: {}, author: {})",
            typst_str(name),
            typst_str(author)
        )?;
        writeln!(markup, "#set block(spacing: 0pt)")?;
        writeln!(markup, "#set align(center)")?;
        Ok(TypstDoc {
            name: name.to_string(),
            markup,
            images: Vec::new(),
            budget: None,
            pages: 0,
        })
    }

    fn append_page(&mut self, doc: &mut TypstDoc, budget: PageBudget) -> Result<()> {
        // A `set page` rule starts a new page by itself, so it is only emitted
        // for the first page or when the budget changes.
        if doc.budget == Some(budget) {
            writeln!(doc.markup, "#pagebreak(weak: true)")?;
        } else {
            writeln!(
                doc.markup,
                "#set page(width: {}pt, height: {}pt, margin: 0pt)",
                budget.width, budget.height
            )?;
        }
        doc.budget = Some(budget);
        doc.pages += 1;
        Ok(())
    }

    fn place_image(&mut self, doc: &mut TypstDoc, artifact: &ArtifactRef, fit: FitBox) -> Result<()> {
        let name = format!("img-{:04}.png", doc.images.len());
        writeln!(
            doc.markup,
            "#block(image({}, width: {}pt, height: {}pt, fit: \"contain\"))",
            typst_str(&name),
            fit.width,
            fit.height
        )?;
        doc.images.push((name, artifact.path.clone()));
        Ok(())
    }

    fn finalize(&mut self, doc: TypstDoc) -> Result<PathBuf> {
        debug!(
            "pdf: building '{}' ({} pages, {} images)",
            doc.name,
            doc.pages,
            doc.images.len()
        );
        let world = ArchiveWorld::new(&doc.markup, &doc.images, &self.fonts);
        let document = compile_document(&world)?;
        let bytes = export_pdf(&document)?;

        let stem = self.claim_name(&doc.name);
        let path = self.output_dir.join(format!("{stem}.pdf"));
        fs::write(&path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
        info!(
            "pdf: wrote {} ({} pages, {} bytes)",
            path.display(),
            document.pages.len(),
            bytes.len()
        );
        Ok(path)
    }
}
