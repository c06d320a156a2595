//! Common test utilities for the feed server suites

pub mod helpers;

pub use helpers::{TestHelpers, TestServer};
