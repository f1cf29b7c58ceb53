// SPDX-License-Identifier: MPL-2.0

use super::{process_table, ExitCode, Pid, Process, ProcessFilter};
use crate::prelude::*;

bitflags! {
    /// Options accepted by `waitpid`.
    pub struct WaitOptions: u32 {
        /// Return immediately instead of blocking when no matching
        /// child has exited yet.
        const WNOHANG = 0x1;
    }
}

/// Waits for a child matching `filter` to exit, reaping it.
///
/// Returns the reaped child's pid and exit status, or `Ok(None)` when
/// `WNOHANG` was given and no matching child has exited yet. A call
/// with no matching children at all fails with ECHILD.
///
/// Reaping is the second phase of process destruction: the zombie is
/// unlinked from the process tree and the process table, and the last
/// references to it go away with it.
pub fn wait_child_exit(
    process: &Arc<Process>,
    filter: ProcessFilter,
    options: WaitOptions,
) -> Result<Option<(Pid, ExitCode)>> {
    process.children_wait_queue.wait_until(|| {
        let zombie = {
            let children = process.children.lock();
            let mut any_match = false;
            let mut found = None;
            for child in children.values() {
                if !filter.matches(child) {
                    continue;
                }
                any_match = true;
                if child.is_zombie() {
                    found = Some(child.clone());
                    break;
                }
            }
            if !any_match {
                return Some(Err(Error::with_message(
                    Errno::ECHILD,
                    "no child to wait for",
                )));
            }
            found
        };

        if let Some(zombie) = zombie {
            let pid = zombie.pid();
            let exit_code = zombie.exit_code().expect("zombie without exit status");
            process.children.lock().remove(&pid);
            process_table::remove(pid);
            return Some(Ok(Some((pid, exit_code))));
        }

        if options.contains(WaitOptions::WNOHANG) {
            return Some(Ok(None));
        }
        // Sleep until a child exits and wakes us.
        None
    })
}
