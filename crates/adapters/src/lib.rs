// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! triage-adapters: external-system adapters
//!
//! Each subsystem is a trait with a production implementation and a
//! test-support fake: `rtr` wraps the vendor control plane, `s3` wraps
//! object storage.

pub mod rtr;
pub mod s3;

pub use rtr::{
    BatchSession, ClientFactory, CloudClient, CommandStatus, DeviceDetails, FalconClient,
    RtrError, SessionHandle,
};
pub use s3::{ObjectStore, S3Store, StoreError};

#[cfg(any(test, feature = "test-support"))]
pub use rtr::fake::{FakeCloudClient, RtrCall};
#[cfg(any(test, feature = "test-support"))]
pub use s3::fake::FakeObjectStore;
