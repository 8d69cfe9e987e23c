//! Cooperative cancellation.
//!
//! The engine polls a `CancelToken` at every suspension point (poll tick,
//! decomposed node, drain state). Ctrl-C sets a process-wide flag through a
//! `sigaction` handler; tokens created with [`CancelToken::with_sigint`]
//! observe it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::ArchiveError;

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    // Only async-signal-safe work here: a single atomic store.
    SIGINT_RECEIVED.store(true, Ordering::SeqCst);
}

/// Route SIGINT into the process-wide cancellation flag.
///
/// A second Ctrl-C is not special-cased: the run stops at the next check.
pub fn install_sigint_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only touches an AtomicBool.
    unsafe { signal::sigaction(Signal::SIGINT, &action) }
        .context("failed to install SIGINT handler")?;
    Ok(())
}

#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    sigint: bool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also trips when SIGINT arrives.
    pub fn with_sigint() -> Self {
        Self {
            flag: Arc::default(),
            sigint: true,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || (self.sigint && SIGINT_RECEIVED.load(Ordering::SeqCst))
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<(), ArchiveError> {
        if self.is_cancelled() {
            Err(ArchiveError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early with `Err(Cancelled)`.
    pub fn sleep(&self, duration: Duration) -> Result<(), ArchiveError> {
        const SLICE: Duration = Duration::from_millis(100);
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(SLICE.min(deadline - now));
        }
    }
}
