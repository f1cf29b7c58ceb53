// SPDX-License-Identifier: MPL-2.0

use crate::{prelude::*, vm::perms::VmPerms};

/// The description of one user-mode page fault.
///
/// The handler is only ever invoked for user-mode faults; an
/// unexpected kernel-mode fault is a kernel bug and is handled (by
/// panicking) long before this layer.
#[derive(Clone, Copy, Debug)]
pub struct PageFaultInfo {
    /// The faulting virtual address.
    pub address: Vaddr,
    /// The access that caused the fault: READ, WRITE, or EXEC.
    pub required_perms: VmPerms,
}

/// Types that can handle a user-mode page fault.
pub trait PageFaultHandler {
    /// Tries to resolve the fault. `Ok(())` means a translation is
    /// installed and the access may be retried; an error carries the
    /// errno that decides the faulting process's fate.
    fn handle_page_fault(&self, page_fault_info: &PageFaultInfo) -> Result<()>;
}
