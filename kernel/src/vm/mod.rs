// SPDX-License-Identifier: MPL-2.0

//! Virtual memory: memory objects, address-space maps, and the
//! page-fault handler.

pub mod page_fault_handler;
pub mod perms;
pub mod vmar;
pub mod vmo;
