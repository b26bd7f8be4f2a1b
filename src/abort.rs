//! Cooperative cancellation: an abort signal/handle pair and an [`Abortable`]
//! future wrapper.
//!
//! [`select`](crate::select) owns one [`AbortHandle`] per race and hands its
//! [`AbortSignal`] to every constituent operation, so that losers observe the
//! abort even when they have squirrelled the signal away somewhere the
//! coordinator cannot reach by dropping futures alone.

use crate::wait_list::{wake_all, Token, WaitList};
use pin_project::{pin_project, pinned_drop};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

#[derive(Debug)]
struct Shared {
    fired: AtomicBool,
    waiters: Mutex<WaitList<Waker>>,
}

/// The firing side of an abort pair.
///
/// Calling [`abort`](AbortHandle::abort) is idempotent and wakes every task
/// currently waiting on the paired [`AbortSignal`]. Dropping the handle
/// without firing it does *not* abort.
#[derive(Debug)]
pub struct AbortHandle {
    shared: Arc<Shared>,
}

/// The observing side of an abort pair.
///
/// Signals are cheap to clone; all clones observe the same abort. An abort is
/// observable both synchronously ([`is_aborted`](AbortSignal::is_aborted)) and
/// asynchronously ([`wait_for_abort`](AbortSignal::wait_for_abort)).
#[derive(Debug, Clone)]
pub struct AbortSignal {
    shared: Arc<Shared>,
}

/// Returns a connected [`AbortHandle`]/[`AbortSignal`] pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let shared = Arc::new(Shared {
        fired: AtomicBool::new(false),
        waiters: Mutex::new(WaitList::new()),
    });
    (
        AbortHandle {
            shared: shared.clone(),
        },
        AbortSignal { shared },
    )
}

// === impl AbortHandle ===

impl AbortHandle {
    /// Fire the abort, waking every waiter on the paired signal.
    ///
    /// Only the first call has any effect.
    pub fn abort(&self) {
        if self.shared.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!(target: "chansel::abort", "abort fired");
        let wakers: Vec<Waker> = self.shared.waiters.lock().unwrap().drain().collect();
        wake_all(wakers);
    }

    /// Returns `true` if [`abort`](Self::abort) has been called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.shared.fired.load(Ordering::SeqCst)
    }

    /// Returns another [`AbortSignal`] observing this handle.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            shared: self.shared.clone(),
        }
    }
}

// === impl AbortSignal ===

impl AbortSignal {
    /// Returns `true` if the paired handle has fired.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.shared.fired.load(Ordering::SeqCst)
    }

    /// Wait until the paired handle fires.
    ///
    /// Completes immediately if the abort already happened.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future removes its waiter entry; it holds no
    /// resources afterwards.
    pub fn wait_for_abort(&self) -> WaitForAbort<'_> {
        WaitForAbort {
            signal: self,
            token: None,
        }
    }
}

/// Future returned by [`AbortSignal::wait_for_abort`].
#[derive(Debug)]
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct WaitForAbort<'a> {
    signal: &'a AbortSignal,
    token: Option<Token>,
}

impl Future for WaitForAbort<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        let mut waiters = this.signal.shared.waiters.lock().unwrap();
        // The flag must be read under the lock: `abort` sets it before
        // draining, so a read outside the lock could miss a concurrent fire.
        if this.signal.shared.fired.load(Ordering::SeqCst) {
            this.token = None;
            return Poll::Ready(());
        }
        match this.token.and_then(|token| waiters.get_mut(token)) {
            Some(waker) => waker.clone_from(cx.waker()),
            None => this.token = Some(waiters.push(cx.waker().clone())),
        }
        Poll::Pending
    }
}

impl Drop for WaitForAbort<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.signal.shared.waiters.lock().unwrap().remove(token);
        }
    }
}

// === impl Abortable ===

/// A [`Future`] that completes early with [`Aborted`] when an
/// [`AbortSignal`] fires.
///
/// # Output
///
/// - [`Ok`]`(F::Output)` if the inner future completed before the signal
///   fired.
/// - [`Err`]`(`[`Aborted`]`)` if the signal fired first. If the signal had
///   already fired when `Abortable` is first polled, the inner future is
///   never polled at all.
///
/// # Cancellation
///
/// The inner future is dropped on every settlement path (completion, abort,
/// or the `Abortable` itself being dropped), so cleanup written in the inner
/// future's `Drop` runs exactly once.
#[pin_project(PinnedDrop)]
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct Abortable<F> {
    #[pin]
    future: F,
    signal: AbortSignal,
    token: Option<Token>,
}

impl<F: Future> Abortable<F> {
    /// Wraps `future` so that it completes with [`Aborted`] when `signal`
    /// fires.
    pub fn new(future: F, signal: &AbortSignal) -> Self {
        Self {
            future,
            signal: signal.clone(),
            token: None,
        }
    }
}

impl<F: Future> Future for Abortable<F> {
    type Output = Result<F::Output, Aborted>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        // The abort wins ties: check the signal before polling the wrapped
        // future, so an abort delivered between polls is always observed.
        {
            let mut waiters = this.signal.shared.waiters.lock().unwrap();
            if this.signal.shared.fired.load(Ordering::SeqCst) {
                *this.token = None;
                return Poll::Ready(Err(Aborted::new()));
            }
            match this.token.and_then(|token| waiters.get_mut(token)) {
                Some(waker) => waker.clone_from(cx.waker()),
                None => *this.token = Some(waiters.push(cx.waker().clone())),
            }
        }

        match this.future.poll(cx) {
            Poll::Ready(output) => {
                if let Some(token) = this.token.take() {
                    this.signal.shared.waiters.lock().unwrap().remove(token);
                }
                Poll::Ready(Ok(output))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[pinned_drop]
impl<F> PinnedDrop for Abortable<F> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if let Some(token) = this.token.take() {
            this.signal.shared.waiters.lock().unwrap().remove(token);
        }
    }
}

impl<F> fmt::Debug for Abortable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Abortable")
            .field("aborted", &self.signal.is_aborted())
            .finish_non_exhaustive()
    }
}

// === impl Aborted ===

/// An error indicating that an operation was cancelled by an [`AbortSignal`]
/// before it completed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Aborted(());

impl Aborted {
    pub(crate) const fn new() -> Self {
        Self(())
    }
}

impl fmt::Display for Aborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("aborted")
    }
}

impl std::error::Error for Aborted {}
