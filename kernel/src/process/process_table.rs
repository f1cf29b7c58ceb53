// SPDX-License-Identifier: MPL-2.0

//! The global table of live (and zombie) processes, and the init
//! process that adopts orphans.

use super::{Pid, Process, ProcessVm};
use crate::{fs::FileTable, prelude::*};

static PROCESS_TABLE: Mutex<BTreeMap<Pid, Arc<Process>>> = Mutex::new(BTreeMap::new());
static INIT_PROCESS: Once<Arc<Process>> = Once::new();

/// Returns the init process, creating it on first use.
pub fn init_process() -> Arc<Process> {
    INIT_PROCESS
        .call_once(|| {
            let init = Process::new(
                "init",
                ProcessVm::alloc().expect("failed to build the init address space"),
                FileTable::new(),
            );
            PROCESS_TABLE.lock().insert(init.pid(), init.clone());
            init
        })
        .clone()
}

/// Adds a process to the table.
pub fn register(process: &Arc<Process>) {
    PROCESS_TABLE.lock().insert(process.pid(), process.clone());
}

/// Removes a reaped process from the table.
pub fn remove(pid: Pid) {
    PROCESS_TABLE.lock().remove(&pid);
}

/// Looks up a process by pid.
pub fn get(pid: Pid) -> Option<Arc<Process>> {
    PROCESS_TABLE.lock().get(&pid).cloned()
}
