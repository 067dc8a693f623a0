//! Descriptors serviced by the reactor.

use futures::future::LocalBoxFuture;
use std::fmt;

/// Future that services a descriptor's readiness events until it closes.
pub type DescriptorFuture = LocalBoxFuture<'static, ()>;

/// An I/O source the reactor services on its thread.
///
/// `serve` is polled by the reactor until it completes, which the reactor
/// treats as the descriptor closing. `close` releases the underlying
/// resource and must be idempotent; the reactor calls it for descriptors
/// whose ownership was transferred to it.
pub trait Descriptor {
    /// Short label used in logs.
    fn describe(&self) -> String;

    /// Returns the future that services this descriptor.
    fn serve(self: std::rc::Rc<Self>) -> DescriptorFuture;

    /// Releases the underlying resource.
    fn close(&self);
}

/// Who releases a descriptor's resource once the reactor stops servicing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The reactor closes the descriptor when it is removed
    Transferred,
    /// The registrant keeps the resource and closes it itself
    Borrowed,
}

/// Identifier of a registered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(pub(crate) u64);

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd-{}", self.0)
    }
}

/// Identifier of a registered timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutId(pub(crate) u64);

impl fmt::Display for TimeoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timeout-{}", self.0)
    }
}
