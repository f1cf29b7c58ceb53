// SPDX-License-Identifier: MPL-2.0

use minos_frame::cpu::UserContext;

use super::{process_table, Process, ProcessVm};
use crate::{prelude::*, thread, thread::Thread, vm::vmar::Vmar};

/// The implementation of `fork(2)`.
///
/// The child gets a structural copy of the parent's address space in
/// which every private mapping pair has a fresh pair of twin shadow
/// objects interposed over the previously shared object: the old
/// object becomes the immutable common ancestor, and each side's
/// future writes land in its own shadow. The parent's installed
/// translations are wiped so that its next write faults and is served
/// from its new shadow; the child starts with no translations at all.
///
/// `parent_ctx` is the parent's trap frame. The child's thread gets a
/// copy with the syscall return register set to zero, so the same
/// `fork` call returns the child's pid in the parent and zero in the
/// child.
pub fn clone_process(
    parent: &Arc<Process>,
    parent_ctx: &UserContext,
) -> Result<Arc<Process>> {
    // Duplicate the lightweight state: heap bounds, open files (one
    // reference bump per file), and the structural address-space copy.
    let vm = ProcessVm::fork_from(parent.vm());
    let file_table = parent.file_table().lock().clone();
    let child = Process::new(parent.name(), vm, file_table);

    let parent_vmar = parent.root_vmar();
    let child_vmar = child.root_vmar();

    // Both sides still share every memory object; split the private
    // ones with twin shadows, then force the parent to re-fault so
    // its writes go through its new shadow.
    Vmar::interpose_private_shadows(&parent_vmar, &child_vmar);
    parent_vmar.invalidate_all();

    *child.parent.lock() = Arc::downgrade(parent);
    parent.children.lock().insert(child.pid(), child.clone());
    process_table::register(&child);

    let mut child_ctx = *parent_ctx;
    child_ctx.set_syscall_ret(0);
    thread::submit(Thread::new(&child, child_ctx));

    debug!("forked pid {} from pid {}", child.pid(), parent.pid());
    Ok(child)
}
