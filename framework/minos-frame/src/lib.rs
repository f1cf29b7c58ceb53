// SPDX-License-Identifier: MPL-2.0

//! The machine substrate of the minos kernel.
//!
//! This crate plays the role that real hardware and the lowest-level
//! kernel runtime would play under the kernel proper: page frames,
//! per-address-space page tables with TLB shootdown bookkeeping,
//! synchronization primitives, and the saved user register file that
//! the thread machinery snapshots and restores.
//!
//! Everything here is mechanism; policy (address-space layout, paging
//! decisions, copy-on-write) lives in the kernel crate on top.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod cpu;
mod error;
pub mod sync;
pub mod vm;

pub use self::error::Error;

/// The frame-level result type.
pub type Result<T> = core::result::Result<T, Error>;
