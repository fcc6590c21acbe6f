//! Deferred values for a single-threaded event loop.
//!
//! A [`Deferred`] stands for a result that is not available yet. It settles
//! exactly once, to a value or to a reason, and any number of observers may
//! chain continuations onto it before or after that happens. Continuations
//! never run inline: they are queued on the [`EventLoop`] that owns the
//! value and run on a later [`EventLoop::turn`].
//!
//! ```
//! use deferred_value::{Deferred, EventLoop};
//! use std::time::Duration;
//!
//! let lp = EventLoop::new();
//! let greeting = Deferred::<_, String>::resolve_delay(&lp, "hello", Duration::from_millis(5))
//!     .and_then(|word| Ok(format!("{word}, world")))
//!     .catch(|reason| Ok(format!("failed: {reason}")));
//! assert_eq!(lp.block_on(&greeting), Ok(Ok("hello, world".to_string())));
//! ```
mod combinators;
mod constructors;
mod deferred;
mod error;
mod event_loop;
mod then;
mod wait;

pub use deferred::{Deferred, Producer, Status};
pub use error::Error;
pub use event_loop::{Clock, EventLoop, LoopConfig};
pub use then::Resolution;
pub use wait::Wait;
