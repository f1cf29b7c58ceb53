// SPDX-License-Identifier: MPL-2.0

//! Kernel memory management: the central page cache.

pub mod page_cache;

pub use page_cache::page_cache;
