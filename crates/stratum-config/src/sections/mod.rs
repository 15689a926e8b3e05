// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for the controller.

pub mod controller;
pub mod executor;
pub mod logging;
pub mod sync;

pub use controller::{ControllerConfig, ControllerConfigLayer};
pub use executor::{ExecutorConfig, ExecutorConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use sync::{SyncConfig, SyncConfigLayer};
