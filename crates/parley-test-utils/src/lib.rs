// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides broadcast test doubles and a harness with a temp SQLite store so
//! tests run without a relay or any other external service.
//!
//! # Components
//!
//! - [`RecordingDriver`] - captures every delivered envelope
//! - [`FailingDriver`] - rejects every delivery
//! - [`TestHarness`] - temp store plus recording driver

pub mod harness;
pub mod mock_driver;

pub use harness::{TestHarness, admin, customer, provider, side_of};
pub use mock_driver::{FailingDriver, RecordingDriver};
