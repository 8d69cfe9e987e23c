//! Page packing: greedy next-fit of segments into fixed-height pages.

use log::{debug, info};

use crate::error::ArchiveError;
use crate::segment::Segment;

/// Segments destined for one output page, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub segments: Vec<Segment>,
}

impl Page {
    /// Summed segment height.
    pub fn height(&self) -> u64 {
        self.segments.iter().map(|s| u64::from(s.height)).sum()
    }

    /// A single segment taller than the page budget.
    pub fn overflows(&self, page_height: u32) -> bool {
        self.height() > u64::from(page_height)
    }
}

/// Pack `segments` into pages of at most `page_height`.
///
/// A page is closed as soon as the next segment would bring it to or past the
/// budget; landing exactly on the budget still rolls over, which leaves room
/// for pixel rounding in the captures. Segments are never split or dropped: one
/// taller than the budget gets a page of its own.
pub fn pack(segments: Vec<Segment>, page_height: u32) -> Result<Vec<Page>, ArchiveError> {
    let mut iter = segments.into_iter();
    let first = iter.next().ok_or(ArchiveError::EmptyContent)?;

    let mut running = u64::from(first.height);
    let mut current = vec![first];
    let mut pages = Vec::new();

    for segment in iter {
        let height = u64::from(segment.height);
        if running + height >= u64::from(page_height) {
            pages.push(Page {
                segments: std::mem::take(&mut current),
            });
            running = 0;
        }
        running += height;
        current.push(segment);
    }
    pages.push(Page { segments: current });

    for (i, page) in pages.iter().enumerate() {
        debug!(
            "pack: page {i}: {} segment(s), {}px{}",
            page.segments.len(),
            page.height(),
            if page.overflows(page_height) {
                " (overflow)"
            } else {
                ""
            }
        );
    }
    info!("pack: {} page(s) at {page_height}px", pages.len());
    Ok(pages)
}
