//! # browser
//!
//! The Browser Pool (spec §4.1/§9): a bounded pool of headless-browser
//! instances, the capability trait audits program against, and the
//! dialog/console event plumbing client-side audits read from.

pub mod capability;
pub mod pool;

pub use capability::{BrowserPage, ConsoleEvent, DialogEvent, SyntheticInteraction};
pub use pool::{BrowserFactory, BrowserHandle, BrowserPool};
