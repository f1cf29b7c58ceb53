// SPDX-License-Identifier: MPL-2.0

//! Compile-time configuration constants.

/// The size in bytes of one page frame.
pub const PAGE_SIZE: usize = 4096;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: usize = 12;

/// The first byte past the end of user space.
///
/// Matches a 47-bit lower-half virtual address space.
pub const MAX_USERSPACE_VADDR: usize = 0x0000_8000_0000_0000;

/// The lowest mappable user address. The pages below are kept unusable
/// so that null-pointer dereferences always fault.
pub const USER_LOWEST_VADDR: usize = 0x1_0000;

/// The size in bytes of a kernel stack in the thread model.
pub const KERNEL_STACK_SIZE: usize = 64 * 1024;
