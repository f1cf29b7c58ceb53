// SPDX-License-Identifier: MPL-2.0

use super::{process_table, ExitCode, Process, ProcessState};
use crate::prelude::*;

/// The first phase of process destruction, run by the exiting side
/// (or by the fault handler on its behalf).
///
/// The address space and file table are torn down here, releasing
/// every memory-object and file reference the process held; orphaned
/// children are handed to init. What remains is a zombie carrying the
/// exit status, reaped by the parent's `waitpid` (the second phase).
pub fn do_exit(process: &Process, exit_code: ExitCode) {
    {
        let mut state = process.state.lock();
        if *state == ProcessState::Zombie {
            return;
        }
        *state = ProcessState::Zombie;
    }
    *process.exit_code.lock() = Some(exit_code);
    debug!("pid {} exits with status {}", process.pid(), exit_code);

    process.vm.clear();
    *process.file_table.lock() = crate::fs::FileTable::new();

    let init = process_table::init_process();
    if process.pid() != init.pid() {
        let orphans: Vec<Arc<Process>> = core::mem::take(&mut *process.children.lock())
            .into_values()
            .collect();
        for orphan in orphans {
            *orphan.parent.lock() = Arc::downgrade(&init);
            init.children.lock().insert(orphan.pid(), orphan);
        }
    }

    if let Some(parent) = process.parent() {
        parent.children_wait_queue.wake_all();
    }
}
