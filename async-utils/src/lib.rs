//! Async building blocks shared by the kubeassist crates.
//!
//! - [`OrCancelExt`]: race a future against a `CancellationToken` and a
//!   deadline.
//! - [`SingleFlight`]: memoize one expensive computation so that overlapping
//!   callers share the in-flight result instead of duplicating the work.

mod cancel;
mod single_flight;

pub use cancel::Interrupted;
pub use cancel::OrCancelExt;
pub use single_flight::SingleFlight;
