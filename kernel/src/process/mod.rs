// SPDX-License-Identifier: MPL-2.0

//! Processes: isolated address spaces plus the fork/wait/exit
//! lifecycle.

mod clone;
mod exit;
mod process_filter;
pub mod process_table;
pub mod process_vm;
mod wait;

use core::sync::atomic::{AtomicU32, Ordering};

use minos_frame::sync::WaitQueue;

pub use self::{
    clone::clone_process,
    exit::do_exit,
    process_filter::ProcessFilter,
    process_vm::{Heap, ProcessVm},
    wait::{wait_child_exit, WaitOptions},
};
use crate::{
    fs::FileTable,
    prelude::*,
    vm::{
        page_fault_handler::{PageFaultHandler, PageFaultInfo},
        vmar::Vmar,
    },
};

/// The process id type.
pub type Pid = u32;
/// The exit status of a process.
pub type ExitCode = i32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProcessState {
    Alive,
    /// Exited but not yet reaped by the parent.
    Zombie,
}

/// A process.
///
/// Destruction is two-phase: `do_exit` (run by the exiting side, or on
/// its behalf by the fault handler) tears down the address space and
/// file table and leaves a zombie carrying only the exit status; the
/// parent's `waitpid` reaps the zombie out of the process tree.
pub struct Process {
    pid: Pid,
    name: String,
    state: Mutex<ProcessState>,
    exit_code: Mutex<Option<ExitCode>>,
    parent: Mutex<Weak<Process>>,
    children: Mutex<BTreeMap<Pid, Arc<Process>>>,
    children_wait_queue: WaitQueue,
    vm: ProcessVm,
    file_table: Mutex<FileTable>,
}

fn alloc_pid() -> Pid {
    static NEXT_PID: AtomicU32 = AtomicU32::new(1);
    NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

impl Process {
    fn new(name: &str, vm: ProcessVm, file_table: FileTable) -> Arc<Self> {
        Arc::new(Self {
            pid: alloc_pid(),
            name: name.to_string(),
            state: Mutex::new(ProcessState::Alive),
            exit_code: Mutex::new(None),
            parent: Mutex::new(Weak::new()),
            children: Mutex::new(BTreeMap::new()),
            children_wait_queue: WaitQueue::new(),
            vm,
            file_table: Mutex::new(file_table),
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a fresh user process, child of init, with an empty
    /// file table and a newly mapped heap.
    pub fn spawn(name: &str) -> Result<Arc<Self>> {
        let process = Self::new(name, ProcessVm::alloc()?, FileTable::new());
        let init = process_table::init_process();
        *process.parent.lock() = Arc::downgrade(&init);
        init.children.lock().insert(process.pid, process.clone());
        process_table::register(&process);
        Ok(process)
    }

    pub fn is_zombie(&self) -> bool {
        *self.state.lock() == ProcessState::Zombie
    }

    /// The exit status, once the process has exited.
    pub fn exit_code(&self) -> Option<ExitCode> {
        *self.exit_code.lock()
    }

    pub fn parent(&self) -> Option<Arc<Process>> {
        self.parent.lock().upgrade()
    }

    pub fn vm(&self) -> &ProcessVm {
        &self.vm
    }

    /// The root VMAR of the process's address space.
    pub fn root_vmar(&self) -> Arc<Vmar> {
        self.vm.root_vmar()
    }

    pub fn heap(&self) -> &Heap {
        self.vm.heap()
    }

    pub fn file_table(&self) -> &Mutex<FileTable> {
        &self.file_table
    }

    pub fn children_wait_queue(&self) -> &WaitQueue {
        &self.children_wait_queue
    }

    /// Handles a user page fault on behalf of this process.
    ///
    /// A fault the address space cannot resolve kills the process: an
    /// access violation records EFAULT as the exit status, a failure
    /// to get memory for the translation records ENOMEM. Faults are
    /// never retried.
    pub fn handle_page_fault(&self, info: &PageFaultInfo) {
        if self.is_zombie() {
            return;
        }
        if let Err(e) = self.root_vmar().handle_page_fault(info) {
            let status = match e.error() {
                Errno::ENOMEM => Errno::ENOMEM,
                _ => Errno::EFAULT,
            };
            debug!(
                "pid {} killed by unresolvable fault at {:#x}: {}",
                self.pid, info.address, e
            );
            do_exit(self, status as ExitCode);
        }
    }
}
