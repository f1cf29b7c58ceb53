// SPDX-License-Identifier: MPL-2.0

use crate::prelude::*;

bitflags! {
    /// The memory access permissions of a mapping.
    ///
    /// An empty set means no access at all: every user reference to
    /// the mapping faults.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VmPerms: u32 {
        /// Readable.
        const READ  = 1 << 0;
        /// Writable.
        const WRITE = 1 << 1;
        /// Executable.
        const EXEC  = 1 << 2;
    }
}
