//! Browser-variant plumbing: launching, page accounting, fingerprinting.
//!
//! Mirrors the donor's flat `browser.rs` + `browser_setup.rs` pair, split
//! into a submodule per concern now that the pool manages many browsers with
//! independent retirement clocks instead of one shared process.

pub mod controller;
pub mod fingerprint;
pub mod launch_context;
pub mod pool;
pub mod setup;

pub use controller::{BrowserController, BrowserLauncher, BrowserState, LaunchedBrowser, LaunchedPage};
pub use fingerprint::{Fingerprint, FingerprintCache};
pub use launch_context::LaunchContext;
pub use pool::{BrowserPool, BrowserPoolHooks};

#[cfg(feature = "headless")]
pub use pool::chromium::ChromiumoxideLauncher;
