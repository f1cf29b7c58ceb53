// SPDX-License-Identifier: MPL-2.0

//! Synchronization primitives.

mod wait;

pub use spin::{Mutex, MutexGuard, Once, RwLock};

pub use self::wait::WaitQueue;
