//! CSP-style channels and a fair multi-way select for cooperative async
//! tasks.
//!
//! This crate provides two tightly-coupled primitives:
//!
//! - [`channel`]: bounded (or rendezvous) typed channels with blocking
//!   backpressure, non-blocking attempts, idempotent close semantics, and
//!   *readiness probes* that observe a channel without consuming from it;
//! - [`Select`]: a race across an arbitrary set of named operations (channel
//!   receives, channel sends, plain futures) that completes with exactly one
//!   winner, resolves ties uniformly at random, and cancels every loser on
//!   the way out.
//!
//! The two are designed together: `Select` never calls `recv()` or `send()`
//! directly. It waits on the channels' probes and then performs a single
//! non-blocking attempt, so an operation that loses the race, or whose
//! readiness is stolen by another task at the last moment, has no effect at
//! all.
//!
//! The [`abort`] module supplies the cancellation plumbing: an
//! [`AbortHandle`]/[`AbortSignal`] pair and an [`Abortable`] future wrapper.
//! `Select` fires its own handle on every exit path, so operations that
//! captured the signal can witness losing the race.
//!
//! All primitives are runtime-agnostic: they speak only [`core::task`] and
//! work on any executor, single-threaded or not.
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn test() {
//! use chansel::{channel, Select};
//!
//! let (tx, rx) = channel(8);
//! let (_stop_tx, stop_rx) = channel::<()>(0);
//!
//! tx.try_send(1).unwrap();
//!
//! enum Step {
//!     Job(Option<u32>),
//!     Stop,
//! }
//!
//! let (name, step) = Select::new()
//!     .recv("job", &rx, Step::Job)
//!     .recv("stop", &stop_rx, |_| Step::Stop)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(name, "job");
//! assert!(matches!(step, Step::Job(Some(1))));
//! # }
//! # test();
//! ```

#![warn(missing_docs, missing_debug_implementations)]

#[macro_use]
mod util;

mod wait_list;

pub mod abort;
pub mod channel;
pub mod select;

#[doc(inline)]
pub use self::abort::{abort_pair, AbortHandle, AbortSignal, Abortable, Aborted};
#[doc(inline)]
pub use self::channel::{
    channel, Receiver, SendError, Sender, TryRecvError, TrySendError,
};
#[doc(inline)]
pub use self::select::{Attempt, Select, SelectError, Selectable};
