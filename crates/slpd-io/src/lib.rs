//! # slpd-io
//!
//! Single-threaded I/O reactor for the Service Location daemon.
//!
//! ## Example
//!
//! ```
//! use slpd_io::Reactor;
//! use std::time::Duration;
//!
//! let reactor = Reactor::new().unwrap();
//! let handle = reactor.handle();
//! {
//!     let _context = reactor.enter();
//!     let stopper = handle.clone();
//!     handle.register_timeout(Duration::from_millis(5), move || stopper.terminate());
//! }
//! reactor.run();
//! assert!(handle.is_terminated());
//! ```

pub mod clock;
pub mod descriptor;
pub mod reactor;

pub use clock::Clock;
pub use descriptor::{Descriptor, DescriptorFuture, DescriptorId, Ownership, TimeoutId};
pub use reactor::{Reactor, ReactorContext, ReactorHandle, ShutdownHandle};
