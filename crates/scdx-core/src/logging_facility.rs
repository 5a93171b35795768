//! Structured logging for snapshot runs
//!
//! Runs log through `tracing` only. A host installs a subscriber once with
//! [`init`]; tests install the capture layer from [`test_capture`] instead
//! and assert on `run_id`-scoped events.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
