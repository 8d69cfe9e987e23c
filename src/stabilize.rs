//! Stabilization poller: scroll a lazily loading view until it stops growing.

use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::cancel::CancelToken;
use crate::capability::Renderer;
use crate::error::ArchiveError;

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Pause between scroll steps, giving lazy content time to arrive.
    pub interval: Duration,
    /// Distance scrolled per step, in CSS pixels.
    pub step: u32,
    /// Upper bound on scroll steps before giving up.
    pub max_steps: u32,
    /// Upper bound on wall-clock time before giving up.
    pub timeout: Duration,
}

/// Scroll `view` in `step` increments until the distance scrolled reaches the
/// scroll extent, i.e. no new content appeared below what was already passed.
///
/// Returns the final extent. The extent may keep growing while we scroll; the
/// loop only ends when scrolling outpaces growth, or when a step/time bound is
/// hit (`StabilizationTimeout`).
pub fn wait_until_stable<R: Renderer>(
    view: &mut R,
    settings: &PollSettings,
    cancel: &CancelToken,
) -> Result<u32, ArchiveError> {
    let start = Instant::now();
    let mut scrolled: u64 = 0;
    let mut steps: u32 = 0;

    loop {
        cancel.check()?;

        let before = view
            .scroll_extent()
            .map_err(ArchiveError::renderer("read scroll extent"))?;
        view.scroll_by(settings.step)
            .map_err(ArchiveError::renderer("scroll"))?;
        scrolled += u64::from(settings.step);
        steps += 1;
        let extent = view
            .scroll_extent()
            .map_err(ArchiveError::renderer("read scroll extent"))?;
        trace!("stabilize: step {steps}, scrolled={scrolled}, extent {before} -> {extent}");

        if scrolled >= u64::from(extent) {
            info!(
                "stabilize: settled at {extent}px after {steps} step(s) in {:.1}ms",
                start.elapsed().as_secs_f64() * 1000.0
            );
            return Ok(extent);
        }

        if steps >= settings.max_steps || start.elapsed() >= settings.timeout {
            debug!(
                "stabilize: giving up, steps={steps}/{}, elapsed={:.1}s",
                settings.max_steps,
                start.elapsed().as_secs_f64()
            );
            return Err(ArchiveError::StabilizationTimeout { steps, extent });
        }

        cancel.sleep(settings.interval)?;
    }
}
