// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task module - the node's running work as seen by the cancellation sweep.

pub mod mock;
mod traits;

pub use mock::{MockNodeResourceMonitor, MockTaskTracker};
pub use traits::*;
