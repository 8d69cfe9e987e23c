use std::time::Instant;

use anyhow::{Result, bail};
use log::{info, warn};
use typst::layout::PagedDocument;
use typst_pdf::PdfOptions;

use crate::world::ArchiveWorld;

/// Compile the world's main source into a paged document.
pub fn compile_document(world: &ArchiveWorld) -> Result<PagedDocument> {
    let start = Instant::now();
    let warned = typst::compile::<PagedDocument>(world);

    for warning in &warned.warnings {
        warn!("typst warning: {}", warning.message);
    }

    let document = match warned.output {
        Ok(doc) => doc,
        Err(errors) => {
            for err in &errors {
                warn!("typst error: {}", err.message);
            }
            bail!("typst compilation failed with {} error(s)", errors.len());
        }
    };

    if document.pages.is_empty() {
        bail!("[BUG] typst produced no pages");
    }
    info!(
        "render: compiled {} page(s) in {:.1}ms",
        document.pages.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(document)
}

/// Encode a compiled document as PDF bytes.
pub fn export_pdf(document: &PagedDocument) -> Result<Vec<u8>> {
    let start = Instant::now();
    let bytes = typst_pdf::pdf(document, &PdfOptions::default()).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.message.to_string()).collect();
        anyhow::anyhow!("PDF export failed: {}", messages.join("; "))
    })?;
    info!(
        "render: exported {} bytes of PDF in {:.1}ms",
        bytes.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(bytes)
}
