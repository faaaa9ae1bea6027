//! Coalesced page watching.
//!
//! LinkedIn renders profile pages client-side and swaps them without a full
//! navigation, so the content script re-checks for the action bar whenever
//! the DOM changes. Mutation batches arrive far faster than the screen
//! refreshes; every batch inside one frame collapses into a single check.

use std::cell::Cell;
use std::rc::Rc;

/// Requests a callback before the next repaint.
pub trait FrameScheduler {
    fn request_frame(&self, callback: Box<dyn FnOnce()>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverPhase {
    Uninitialized,
    /// `document.body` did not exist yet; watching the root element.
    WaitingForBody,
    ObservingBody,
}

/// What the browser-side `MutationObserver` should be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveTarget {
    /// `document.body` with `childList` and `subtree`.
    Body,
    /// `document.documentElement` with `childList` only.
    DocumentElement,
}

pub struct ObserverLoop<F: FrameScheduler> {
    frames: F,
    check: Box<dyn Fn()>,
    phase: Cell<ObserverPhase>,
    pending: Cell<bool>,
    checks_run: Cell<u64>,
}

impl<F: FrameScheduler + 'static> ObserverLoop<F> {
    pub fn new(frames: F, check: impl Fn() + 'static) -> Rc<Self> {
        Rc::new(Self {
            frames,
            check: Box::new(check),
            phase: Cell::new(ObserverPhase::Uninitialized),
            pending: Cell::new(false),
            checks_run: Cell::new(0),
        })
    }

    pub fn phase(&self) -> ObserverPhase {
        self.phase.get()
    }

    pub fn checks_run(&self) -> u64 {
        self.checks_run.get()
    }

    pub fn check_pending(&self) -> bool {
        self.pending.get()
    }

    /// Runs the initial check and reports where to attach the observer.
    pub fn start(&self, body_present: bool) -> ObserveTarget {
        let target = if body_present {
            self.phase.set(ObserverPhase::ObservingBody);
            ObserveTarget::Body
        } else {
            self.phase.set(ObserverPhase::WaitingForBody);
            ObserveTarget::DocumentElement
        };
        log::debug!("observer started on {target:?}");

        self.run_check();
        target
    }

    /// Handles one mutation batch.
    ///
    /// Returns a new target when the observer must move to `document.body`.
    pub fn on_mutations(self: &Rc<Self>, body_present: bool) -> Option<ObserveTarget> {
        let retarget = if self.phase.get() == ObserverPhase::WaitingForBody && body_present {
            self.phase.set(ObserverPhase::ObservingBody);
            Some(ObserveTarget::Body)
        } else {
            None
        };

        self.schedule_check();
        retarget
    }

    fn schedule_check(self: &Rc<Self>) {
        if self.pending.replace(true) {
            return;
        }
        let this = Rc::clone(self);
        self.frames
            .request_frame(Box::new(move || this.run_frame()));
    }

    fn run_frame(&self) {
        self.pending.set(false);
        self.run_check();
    }

    fn run_check(&self) {
        self.checks_run.set(self.checks_run.get() + 1);
        (self.check)();
    }
}
