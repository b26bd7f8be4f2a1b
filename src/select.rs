//! Race heterogeneous pending operations, keeping exactly one winner.
//!
//! [`Select`] waits on a set of named operations (channel receives, channel
//! sends, arbitrary futures) and completes with the first one to succeed,
//! cancelling all the rest. Naively racing `recv()` calls would consume a
//! value from *every* channel that happened to have one, with no way to put
//! the losers back. `Select` therefore races *readiness probes* and only then
//! performs a single non-blocking attempt, so a lost race costs nothing.
//!
//! # Two phases, and stolen readiness
//!
//! A [`Selectable`] operation splits into `poll_ready` (wait until the
//! operation *might* succeed) and `attempt` (perform it non-blockingly).
//! Between a probe waking and the attempt running, another task may service
//! the channel; the attempt then reports [`Attempt::Stolen`] and `Select`
//! quietly re-arms that one operation and keeps racing. Stolen readiness is
//! not a failure and never reaches the caller.
//!
//! # Fairness
//!
//! The operations are permuted once, uniformly at random, before the race
//! starts. When several operations are ready simultaneously the permutation
//! decides the winner, so over many races each ready operation wins equally
//! often. The order is *not* re-randomized on re-arm.
//!
//! # Cancellation
//!
//! `Select` owns an [`AbortHandle`] that fires on every exit path: success,
//! failure, and the `Select` future being dropped, in each case before the
//! result is surfaced. Operations that captured the paired signal (see
//! [`Select::signal`]) observe `is_aborted() == true`; probe waiters are
//! removed when the race is dropped. No timer, waker slot, or queue entry
//! outlives the call.
//!
//! # Examples
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn test() {
//! use chansel::{channel, Select};
//!
//! let (tx, rx) = channel(1);
//! tx.try_send("hello").unwrap();
//!
//! let (name, value) = Select::new()
//!     .recv("mail", &rx, |v| v)
//!     .future("idle", std::future::pending(), |_: ()| None)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(name, "mail");
//! assert_eq!(value, Some("hello"));
//! # }
//! # test();
//! ```

use crate::abort::{abort_pair, AbortHandle, AbortSignal};
use crate::channel::{Receiver, SendError, Sender, TryRecvError, TrySendError};
use crate::channel::{Readable, Writable};
use futures::future::{FutureExt, LocalBoxFuture};
use rand::seq::SliceRandom;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};


type BoxError = Box<dyn StdError + 'static>;

/// The outcome of [`Selectable::attempt`].
#[derive(Debug)]
pub enum Attempt<T> {
    /// The operation performed its effect and produced its output.
    Ready(T),
    /// The readiness reported by `poll_ready` was consumed by another task
    /// before this operation could act on it. Not a failure: the race
    /// re-arms the operation and continues.
    Stolen,
    /// The operation failed. The race ends and the error is surfaced as a
    /// [`SelectError`].
    Failed(Box<dyn StdError + 'static>),
}

/// A two-phase operation usable in a [`Select`]: wait until it might succeed,
/// then try to perform it.
///
/// `poll_ready` must be a pure observation. `attempt` must be non-blocking,
/// and side-effect-free when it returns [`Attempt::Stolen`]. After `Stolen`,
/// `poll_ready` is polled again and must re-register for wakeups.
pub trait Selectable {
    /// What a successful attempt produces.
    type Output;

    /// Waits until [`attempt`](Self::attempt) would plausibly succeed.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<()>;

    /// Performs the operation without blocking.
    fn attempt(&mut self) -> Attempt<Self::Output>;
}

/// The receive side of a channel as a [`Selectable`].
///
/// Produced by [`Receiver::select_recv`]. A successful attempt yields
/// `Some(value)`, or `None` if the channel is closed and drained (closing a
/// channel makes every racing receive on it win with `None`, mirroring
/// [`Receiver::recv`]).
#[derive(Debug)]
pub struct SelectRecv<'a, T> {
    ready: Readable<'a, T>,
    receiver: &'a Receiver<T>,
}

impl<T> Selectable for SelectRecv<'_, T> {
    type Output = Option<T>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.ready).poll(cx)
    }

    fn attempt(&mut self) -> Attempt<Option<T>> {
        match self.receiver.try_recv() {
            Ok(value) => Attempt::Ready(Some(value)),
            Err(TryRecvError::Closed) => Attempt::Ready(None),
            Err(TryRecvError::Empty) => Attempt::Stolen,
        }
    }
}

/// The send side of a channel as a [`Selectable`].
///
/// Produced by [`Sender::select_send`]. The arm owns the value until the send
/// actually happens; if the race is lost the value is simply dropped with the
/// arm. Attempting against a closed channel fails the race with
/// [`SendError`].
#[derive(Debug)]
pub struct SelectSend<'a, T> {
    ready: Writable<'a, T>,
    sender: &'a Sender<T>,
    value: Option<T>,
}

impl<T: 'static> Selectable for SelectSend<'_, T> {
    type Output = ();

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.value.is_none() {
            // Already sent; nothing left to become ready for.
            return Poll::Pending;
        }
        Pin::new(&mut self.ready).poll(cx)
    }

    fn attempt(&mut self) -> Attempt<()> {
        let Some(value) = self.value.take() else {
            return Attempt::Stolen;
        };
        match self.sender.try_send(value) {
            Ok(()) => Attempt::Ready(()),
            Err(TrySendError::Full(value)) => {
                self.value = Some(value);
                Attempt::Stolen
            }
            Err(TrySendError::Closed(value)) => Attempt::Failed(Box::new(SendError(value))),
        }
    }
}

impl<T> Receiver<T> {
    /// Returns this channel's receive operation as a [`Selectable`] for use
    /// in a [`Select`].
    pub fn select_recv(&self) -> SelectRecv<'_, T> {
        SelectRecv {
            ready: self.readable(),
            receiver: self,
        }
    }
}

impl<T> Sender<T> {
    /// Returns a send of `value` on this channel as a [`Selectable`] for use
    /// in a [`Select`].
    pub fn select_send(&self, value: T) -> SelectSend<'_, T> {
        SelectSend {
            ready: self.writable(),
            sender: self,
            value: Some(value),
        }
    }
}

// === impl Select ===

/// A fair race across named operations. See the [module docs](self).
///
/// Built up with [`recv`](Select::recv), [`send`](Select::send),
/// [`selectable`](Select::selectable), [`future`](Select::future) and
/// [`try_future`](Select::try_future), then awaited. Each operation carries a
/// name and a closure folding its natural output into the common result type
/// `R`; awaiting yields `Ok((name, value))` for the winner, or a
/// [`SelectError`] naming the first operation to fail.
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct Select<'a, R> {
    arms: Vec<Arm<'a, R>>,
    handle: AbortHandle,
    signal: AbortSignal,
    shuffled: bool,
}

struct Arm<'a, R> {
    name: &'static str,
    kind: ArmKind<'a, R>,
}

enum ArmKind<'a, R> {
    Channel(Box<dyn DynArm<R> + 'a>),
    Future(LocalBoxFuture<'a, Result<R, BoxError>>),
}

/// Object-safe shim over `Selectable` + the caller's mapping closure.
trait DynArm<R> {
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<()>;
    fn attempt(&mut self) -> Attempt<R>;
}

struct MapArm<S, F> {
    inner: S,
    map: Option<F>,
}

impl<S, F, R> DynArm<R> for MapArm<S, F>
where
    S: Selectable,
    F: FnOnce(S::Output) -> R,
{
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.poll_ready(cx)
    }

    fn attempt(&mut self) -> Attempt<R> {
        match self.inner.attempt() {
            Attempt::Ready(output) => {
                let map = self.map.take().expect("select arm already won");
                Attempt::Ready(map(output))
            }
            Attempt::Stolen => Attempt::Stolen,
            Attempt::Failed(error) => Attempt::Failed(error),
        }
    }
}

impl<'a, R> Select<'a, R> {
    /// Returns an empty race. Awaiting it without adding any operation fails
    /// with [`SelectError::NoOperations`].
    pub fn new() -> Self {
        let (handle, signal) = abort_pair();
        Self {
            arms: Vec::new(),
            handle,
            signal,
            shuffled: false,
        }
    }

    /// Adds a receive on `receiver` under `name`.
    ///
    /// The winning receive yields `Some(value)`, or `None` when the channel
    /// is closed and drained.
    pub fn recv<T>(
        self,
        name: &'static str,
        receiver: &'a Receiver<T>,
        map: impl FnOnce(Option<T>) -> R + 'a,
    ) -> Self
    where
        T: 'a,
    {
        self.selectable(name, receiver.select_recv(), map)
    }

    /// Adds a send of `value` on `sender` under `name`.
    ///
    /// If the channel closes before the send wins, the race fails with a
    /// [`SelectError`] whose source is [`SendError`].
    pub fn send<T>(
        self,
        name: &'static str,
        sender: &'a Sender<T>,
        value: T,
        map: impl FnOnce() -> R + 'a,
    ) -> Self
    where
        T: 'static,
    {
        self.selectable(name, sender.select_send(value), move |()| map())
    }

    /// Adds an arbitrary two-phase operation under `name`.
    pub fn selectable<S>(
        mut self,
        name: &'static str,
        operation: S,
        map: impl FnOnce(S::Output) -> R + 'a,
    ) -> Self
    where
        S: Selectable + 'a,
    {
        self.arms.push(Arm {
            name,
            kind: ArmKind::Channel(Box::new(MapArm {
                inner: operation,
                map: Some(map),
            })),
        });
        self
    }

    /// Adds a future under `name`. The future's output is the operation's
    /// success; it cannot fail the race.
    ///
    /// A future that loses the race is dropped; if it needs to observe the
    /// loss after being moved elsewhere, have it capture
    /// [`signal`](Select::signal).
    pub fn future<F, O>(mut self, name: &'static str, future: F, map: impl FnOnce(O) -> R + 'a) -> Self
    where
        F: Future<Output = O> + 'a,
    {
        self.arms.push(Arm {
            name,
            kind: ArmKind::Future(future.map(|output| Ok(map(output))).boxed_local()),
        });
        self
    }

    /// Adds a fallible future under `name`. `Ok` wins the race; `Err` ends
    /// it with a [`SelectError`] wrapping the error.
    pub fn try_future<F, O, E>(
        mut self,
        name: &'static str,
        future: F,
        map: impl FnOnce(O) -> R + 'a,
    ) -> Self
    where
        F: Future<Output = Result<O, E>> + 'a,
        E: StdError + 'static,
    {
        self.arms.push(Arm {
            name,
            kind: ArmKind::Future(
                future
                    .map(|result| match result {
                        Ok(output) => Ok(map(output)),
                        Err(error) => Err(Box::new(error) as BoxError),
                    })
                    .boxed_local(),
            ),
        });
        self
    }

    /// Returns the signal this race aborts when it settles.
    ///
    /// Hand it to operations that need to witness losing the race even after
    /// the race itself is gone, typically by wrapping their work in
    /// [`Abortable`](crate::abort::Abortable) or by polling
    /// [`wait_for_abort`](AbortSignal::wait_for_abort).
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }
}

impl<R> Default for Select<'_, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, R> Future for Select<'a, R> {
    type Output = Result<(&'static str, R), SelectError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if !this.shuffled {
            // One uniform permutation before any operation is observed; ties
            // between simultaneously-ready operations fall to it.
            this.arms.shuffle(&mut rand::thread_rng());
            this.shuffled = true;
        }

        if this.arms.is_empty() {
            this.handle.abort();
            return Poll::Ready(Err(SelectError::NoOperations));
        }

        for arm in &mut this.arms {
            match &mut arm.kind {
                ArmKind::Future(future) => {
                    if let Poll::Ready(result) = future.as_mut().poll(cx) {
                        let result = match result {
                            Ok(value) => Ok((arm.name, value)),
                            Err(source) => Err(SelectError::Failed {
                                name: arm.name,
                                source,
                            }),
                        };
                        this.handle.abort();
                        return Poll::Ready(result);
                    }
                }
                ArmKind::Channel(operation) => {
                    // Wait, attempt, and on stolen readiness re-arm just this
                    // operation and keep going.
                    while operation.poll_ready(cx).is_ready() {
                        match operation.attempt() {
                            Attempt::Ready(value) => {
                                this.handle.abort();
                                return Poll::Ready(Ok((arm.name, value)));
                            }
                            Attempt::Failed(source) => {
                                this.handle.abort();
                                return Poll::Ready(Err(SelectError::Failed {
                                    name: arm.name,
                                    source,
                                }));
                            }
                            Attempt::Stolen => {
                                trace!(
                                    target: "chansel::select",
                                    arm = arm.name,
                                    "readiness stolen, re-arming"
                                );
                            }
                        }
                    }
                }
            }
        }

        Poll::Pending
    }
}

impl<R> Drop for Select<'_, R> {
    fn drop(&mut self) {
        // Covers every exit path, including the race being dropped unsettled.
        self.handle.abort();
    }
}

impl<R> fmt::Debug for Select<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.arms.iter().map(|arm| arm.name).collect();
        f.debug_struct("Select")
            .field("arms", &names)
            .field("aborted", &self.handle.is_aborted())
            .finish()
    }
}

// === impl SelectError ===

/// Error produced by awaiting a [`Select`].
#[derive(Debug)]
pub enum SelectError {
    /// The race had no operations to wait on.
    NoOperations,
    /// A constituent operation failed, ending the race. The original error is
    /// preserved unmodified as the [`source`](StdError::source).
    Failed {
        /// The name the failing operation was registered under.
        name: &'static str,
        /// The operation's own error.
        source: Box<dyn StdError + 'static>,
    },
}

impl SelectError {
    /// The name of the operation that failed, if one did.
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Failed { name, .. } => Some(name),
            Self::NoOperations => None,
        }
    }
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOperations => f.pad("select requires at least one operation"),
            Self::Failed { name, source } => {
                write!(f, "select operation {name:?} failed: {source}")
            }
        }
    }
}

impl StdError for SelectError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Failed { source, .. } => Some(source.as_ref()),
            Self::NoOperations => None,
        }
    }
}
