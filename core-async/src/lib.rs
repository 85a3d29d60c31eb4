//! Async runtime abstraction layer for the signage player core.
//!
//! All core-* crates depend on this crate instead of depending on Tokio
//! directly. The surface is deliberately small:
//!
//! - `task`: Task spawning and join handles
//! - `time`: Timers, intervals, timeouts and the monotonic `Instant`
//! - `sync`: Channels, locks, cancellation and supersession gates
//! - `runtime`: Blocking entry points used by sync code and test macros
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(50)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.ok(), Some(42));
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

// `select!` is re-exported so actors can multiplex commands and timers.
pub use tokio::select;

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

// Re-export commonly used types at crate root for convenience
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
