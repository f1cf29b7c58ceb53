// SPDX-License-Identifier: MPL-2.0

//! End-to-end scenarios driving the VM core through the syscall
//! surface: mapping, copy-on-write forking, heap growth, shared file
//! mappings, and fault-driven process death.

use minos_frame::config::PAGE_SIZE;
use minos_kernel::{
    error::Errno,
    fs::{AccessMode, File, RamVnode, Vnode},
    process::{clone_process, do_exit, Process, WaitOptions},
    syscall::{
        sys_brk, sys_fork, sys_mmap, sys_munmap, sys_waitpid, Context, MMapFlags, SyscallReturn,
    },
    thread,
    vm::{page_fault_handler::PageFaultInfo, perms::VmPerms},
};

fn rw() -> VmPerms {
    VmPerms::READ | VmPerms::WRITE
}

fn mmap(
    ctx: &Context,
    addr: usize,
    len: usize,
    perms: VmPerms,
    flags: MMapFlags,
    fd: usize,
    offset: usize,
) -> usize {
    let SyscallReturn::Return(ret) = sys_mmap(ctx, addr, len, perms, flags, fd, offset).unwrap();
    ret as usize
}

fn fault(process: &std::sync::Arc<Process>, address: usize, perms: VmPerms) {
    process.handle_page_fault(&PageFaultInfo {
        address,
        required_perms: perms,
    });
}

#[test]
fn anonymous_private_map_write_read_unmap() {
    let process = Process::spawn("scenario-anon").unwrap();
    let ctx = Context::new(&process);

    let addr = mmap(
        &ctx,
        0,
        2 * PAGE_SIZE,
        rw(),
        MMapFlags::MAP_PRIVATE | MMapFlags::MAP_ANONYMOUS,
        0,
        0,
    );

    let vmar = process.root_vmar();
    vmar.write_bytes(addr, &[0x41, 0x42]).unwrap();
    let mut buf = [0u8; 2];
    vmar.read_bytes(addr, &mut buf).unwrap();
    assert_eq!(buf, [0x41, 0x42]);

    let SyscallReturn::Return(ret) = sys_munmap(&ctx, addr, 2 * PAGE_SIZE).unwrap();
    assert_eq!(ret, 0);

    // Touching the unmapped range now kills the process with EFAULT.
    fault(&process, addr, VmPerms::READ);
    assert!(process.is_zombie());
    assert_eq!(process.exit_code(), Some(Errno::EFAULT as i32));
}

#[test]
fn mmap_validation_rejects_without_mapping() {
    let process = Process::spawn("scenario-einval").unwrap();
    let ctx = Context::new(&process);
    let before = process.root_vmar().num_mappings();

    let misaligned = sys_mmap(
        &ctx,
        0x2000_1234,
        PAGE_SIZE,
        rw(),
        MMapFlags::MAP_PRIVATE | MMapFlags::MAP_ANONYMOUS | MMapFlags::MAP_FIXED,
        0,
        0,
    );
    assert_eq!(misaligned.unwrap_err().error(), Errno::EINVAL);

    let empty = sys_mmap(
        &ctx,
        0,
        0,
        rw(),
        MMapFlags::MAP_PRIVATE | MMapFlags::MAP_ANONYMOUS,
        0,
        0,
    );
    assert_eq!(empty.unwrap_err().error(), Errno::EINVAL);

    let both_kinds = sys_mmap(
        &ctx,
        0,
        PAGE_SIZE,
        rw(),
        MMapFlags::MAP_PRIVATE | MMapFlags::MAP_SHARED | MMapFlags::MAP_ANONYMOUS,
        0,
        0,
    );
    assert_eq!(both_kinds.unwrap_err().error(), Errno::EINVAL);

    assert_eq!(process.root_vmar().num_mappings(), before);
}

#[test]
fn fork_cow_isolates_parent_and_child() {
    let parent = Process::spawn("scenario-cow-parent").unwrap();
    let ctx = Context::new(&parent);

    let addr = mmap(
        &ctx,
        0,
        PAGE_SIZE,
        rw(),
        MMapFlags::MAP_PRIVATE | MMapFlags::MAP_ANONYMOUS,
        0,
        0,
    );
    parent.root_vmar().write_bytes(addr, &[0xaa]).unwrap();

    let child = clone_process(&parent, &Default::default()).unwrap();

    // The parent diverges after the fork.
    parent.root_vmar().write_bytes(addr, &[0xbb]).unwrap();

    let mut buf = [0u8; 1];
    child.root_vmar().read_bytes(addr, &mut buf).unwrap();
    assert_eq!(buf, [0xaa]);
    parent.root_vmar().read_bytes(addr, &mut buf).unwrap();
    assert_eq!(buf, [0xbb]);

    // And symmetrically: a child write stays invisible to the parent.
    child.root_vmar().write_bytes(addr, &[0xcc]).unwrap();
    parent.root_vmar().read_bytes(addr, &mut buf).unwrap();
    assert_eq!(buf, [0xbb]);
}

#[test]
fn fork_gives_child_return_value_zero() {
    let parent = Process::spawn("scenario-fork-ret").unwrap();
    let ctx = Context::new(&parent);

    let mut parent_ctx = minos_frame::cpu::UserContext::new();
    parent_ctx.set_instruction_pointer(0x40_1000);
    parent_ctx.set_stack_pointer(0x7000_0000);
    parent_ctx.set_syscall_ret(0xdead);

    let SyscallReturn::Return(child_pid) = sys_fork(&ctx, &parent_ctx).unwrap();
    assert!(child_pid > 0);

    // The child's thread was scheduled with the parent's context,
    // except that its syscall return register reads zero.
    let child_thread = loop {
        let thread = thread::take_runnable().expect("forked child thread not scheduled");
        if thread.process().map(|p| p.pid() as isize) == Some(child_pid) {
            break thread;
        }
    };
    let child_ctx = child_thread.user_ctx();
    assert_eq!(child_ctx.instruction_pointer(), 0x40_1000);
    assert_eq!(child_ctx.stack_pointer(), 0x7000_0000);
    assert_eq!(child_ctx.syscall_ret(), 0);
}

#[test]
fn shared_file_mapping_is_visible_across_processes() {
    let vnode = RamVnode::new(PAGE_SIZE);

    let proc_a = Process::spawn("scenario-shared-a").unwrap();
    let proc_b = Process::spawn("scenario-shared-b").unwrap();
    let fd_a = proc_a
        .file_table()
        .lock()
        .install(File::new(vnode.clone(), AccessMode::ReadWrite))
        .unwrap();
    let fd_b = proc_b
        .file_table()
        .lock()
        .install(File::new(vnode, AccessMode::ReadWrite))
        .unwrap();

    let addr_a = mmap(
        &Context::new(&proc_a),
        0,
        PAGE_SIZE,
        rw(),
        MMapFlags::MAP_SHARED,
        fd_a,
        0,
    );
    let addr_b = mmap(
        &Context::new(&proc_b),
        0,
        PAGE_SIZE,
        rw(),
        MMapFlags::MAP_SHARED,
        fd_b,
        0,
    );

    proc_a.root_vmar().write_bytes(addr_a, b"hi").unwrap();

    // B faults its copy in and observes A's store; both translations
    // resolve to the same frame.
    fault(&proc_b, addr_b, VmPerms::READ);
    fault(&proc_a, addr_a, VmPerms::READ);
    let (paddr_a, _) = proc_a.root_vmar().vm_space().query(addr_a).unwrap();
    let (paddr_b, _) = proc_b.root_vmar().vm_space().query(addr_b).unwrap();
    assert_eq!(paddr_a, paddr_b);

    let mut buf = [0u8; 2];
    proc_b.root_vmar().read_bytes(addr_b, &mut buf).unwrap();
    assert_eq!(&buf, b"hi");
}

#[test]
fn private_file_mapping_stays_private() {
    let vnode = RamVnode::with_contents(b"original file bytes");

    let process = Process::spawn("scenario-file-private").unwrap();
    let fd = process
        .file_table()
        .lock()
        .install(File::new(vnode.clone(), AccessMode::ReadOnly))
        .unwrap();

    let addr = mmap(
        &Context::new(&process),
        0,
        PAGE_SIZE,
        rw(),
        MMapFlags::MAP_PRIVATE,
        fd,
        0,
    );

    let vmar = process.root_vmar();
    vmar.write_bytes(addr, b"CLOBBER").unwrap();
    let mut buf = [0u8; 7];
    vmar.read_bytes(addr, &mut buf).unwrap();
    assert_eq!(&buf, b"CLOBBER");

    // The file itself never sees the private store.
    let mut file_buf = [0u8; 7];
    vnode.clone().read_at(0, &mut file_buf).unwrap();
    assert_eq!(&file_buf, b"origina");
}

#[test]
fn brk_extends_and_shrinks_the_heap() {
    let process = Process::spawn("scenario-brk").unwrap();
    let ctx = Context::new(&process);
    let vmar = process.root_vmar();

    let SyscallReturn::Return(b0) = sys_brk(&ctx, None).unwrap();
    let b0 = b0 as usize;

    // Extending twice; moving to the current break is a no-op.
    let SyscallReturn::Return(b1) = sys_brk(&ctx, Some(b0 + 2 * PAGE_SIZE)).unwrap();
    let b1 = b1 as usize;
    assert_eq!(b1, b0 + 2 * PAGE_SIZE);
    let SyscallReturn::Return(again) = sys_brk(&ctx, Some(b1)).unwrap();
    assert_eq!(again as usize, b1);

    // The grown window is usable memory.
    let pattern: Vec<u8> = (0..(b1 - b0)).map(|i| (i % 251) as u8).collect();
    vmar.write_bytes(b0, &pattern).unwrap();
    let mut readback = vec![0u8; b1 - b0];
    vmar.read_bytes(b0, &mut readback).unwrap();
    assert_eq!(pattern, readback);

    // Fault a translation in so the shrink has something to flush.
    fault(&process, b0, VmPerms::WRITE);
    assert!(vmar.vm_space().query(b0).is_some());
    let flushes_before = vmar.vm_space().tlb_flush_count();

    let SyscallReturn::Return(back) = sys_brk(&ctx, Some(b0)).unwrap();
    assert_eq!(back as usize, b0);
    assert!(vmar.vm_space().query(b0).is_none());
    assert!(vmar.vm_space().tlb_flush_count() > flushes_before);

    // The freed window faults now.
    fault(&process, b0, VmPerms::READ);
    assert!(process.is_zombie());
    assert_eq!(process.exit_code(), Some(Errno::EFAULT as i32));
}

#[test]
fn brk_below_start_is_refused() {
    let process = Process::spawn("scenario-brk-low").unwrap();
    let ctx = Context::new(&process);
    let SyscallReturn::Return(b0) = sys_brk(&ctx, None).unwrap();

    let err = sys_brk(&ctx, Some(b0 as usize - 1)).unwrap_err();
    assert_eq!(err.error(), Errno::ENOMEM);
}

#[test]
fn munmap_splits_an_area_in_half() {
    let process = Process::spawn("scenario-split").unwrap();
    let ctx = Context::new(&process);

    let addr = mmap(
        &ctx,
        0x2100_0000,
        16 * PAGE_SIZE,
        rw(),
        MMapFlags::MAP_PRIVATE | MMapFlags::MAP_ANONYMOUS | MMapFlags::MAP_FIXED,
        0,
        0,
    );
    let vmar = process.root_vmar();
    let vpn = addr / PAGE_SIZE;
    let vmo = vmar.lookup(vpn).unwrap().vmo;
    let refs_before = std::sync::Arc::strong_count(&vmo);
    let mappings_before = vmar.num_mappings();

    sys_munmap(&ctx, addr + 6 * PAGE_SIZE, 4 * PAGE_SIZE).unwrap();

    let low = vmar.lookup(vpn).unwrap();
    let high = vmar.lookup(vpn + 10).unwrap();
    assert_eq!(low.range, vpn..vpn + 6);
    assert_eq!(high.range, vpn + 10..vpn + 16);
    assert!(vmar.lookup(vpn + 6).is_none());
    assert!(vmar.lookup(vpn + 9).is_none());
    assert_eq!(vmar.num_mappings(), mappings_before + 1);

    // Both halves keep a reference on the same object: one more than
    // before the split.
    assert_eq!(std::sync::Arc::strong_count(&vmo), refs_before + 1);
    assert!(std::sync::Arc::ptr_eq(&low.vmo, &high.vmo));
}

#[test]
fn fifty_generation_fork_chain_diverges_per_page() {
    const GENERATIONS: usize = 50;
    const NPAGES: usize = GENERATIONS + 4;

    let first = Process::spawn("scenario-chain").unwrap();
    let addr = mmap(
        &Context::new(&first),
        0,
        NPAGES * PAGE_SIZE,
        rw(),
        MMapFlags::MAP_PRIVATE | MMapFlags::MAP_ANONYMOUS,
        0,
        0,
    );

    // Each generation forks the next and only then writes its own
    // page, so no descendant ever inherits the write.
    let mut line = vec![first];
    for generation in 0..GENERATIONS {
        let next = clone_process(line.last().unwrap(), &Default::default()).unwrap();
        line.last()
            .unwrap()
            .root_vmar()
            .write_bytes(addr + generation * PAGE_SIZE, &[generation as u8 + 1])
            .unwrap();
        line.push(next);
    }
    let last = line.last().unwrap();
    last.root_vmar()
        .write_bytes(addr + GENERATIONS * PAGE_SIZE, &[0xee])
        .unwrap();

    // The 50th descendant sees only its own write; every page an
    // ancestor wrote after forking reads as zero here.
    let mut buf = [0u8; 1];
    last.root_vmar()
        .read_bytes(addr + GENERATIONS * PAGE_SIZE, &mut buf)
        .unwrap();
    assert_eq!(buf, [0xee]);
    for generation in 0..GENERATIONS {
        last.root_vmar()
            .read_bytes(addr + generation * PAGE_SIZE, &mut buf)
            .unwrap();
        assert_eq!(buf, [0u8], "page {} leaked into the descendant", generation);
    }

    // Ancestors keep their own writes.
    for (generation, process) in line.iter().enumerate().take(GENERATIONS) {
        process
            .root_vmar()
            .read_bytes(addr + generation * PAGE_SIZE, &mut buf)
            .unwrap();
        assert_eq!(buf, [generation as u8 + 1]);
    }
}

#[test]
fn waitpid_reaps_exited_child() {
    let parent = Process::spawn("scenario-wait").unwrap();
    let ctx = Context::new(&parent);

    let SyscallReturn::Return(child_pid) = sys_fork(&ctx, &Default::default()).unwrap();
    let child = minos_kernel::process::process_table::get(child_pid as u32).unwrap();

    // Nothing to reap yet.
    let mut status = 0;
    let SyscallReturn::Return(ret) =
        sys_waitpid(&ctx, -1, &mut status, WaitOptions::WNOHANG).unwrap();
    assert_eq!(ret, 0);

    do_exit(&child, 7);
    assert!(child.is_zombie());

    let SyscallReturn::Return(reaped) =
        sys_waitpid(&ctx, child_pid as i32, &mut status, WaitOptions::WNOHANG).unwrap();
    assert_eq!(reaped, child_pid);
    assert_eq!(status, 7);

    // The zombie is gone; waiting again finds no children.
    assert!(minos_kernel::process::process_table::get(child_pid as u32).is_none());
    let err = sys_waitpid(&ctx, child_pid as i32, &mut status, WaitOptions::WNOHANG).unwrap_err();
    assert_eq!(err.error(), Errno::ECHILD);
}

#[test]
fn write_fault_on_readonly_private_file_mapping_kills() {
    let vnode = RamVnode::with_contents(b"readonly");
    let process = Process::spawn("scenario-nodirty").unwrap();
    let fd = process
        .file_table()
        .lock()
        .install(File::new(vnode, AccessMode::ReadOnly))
        .unwrap();

    let addr = mmap(
        &Context::new(&process),
        0,
        PAGE_SIZE,
        VmPerms::READ,
        MMapFlags::MAP_PRIVATE,
        fd,
        0,
    );

    // Reading is fine.
    fault(&process, addr, VmPerms::READ);
    assert!(!process.is_zombie());

    // A write to the read-only private mapping is an access violation,
    // not a copy-on-write opportunity.
    fault(&process, addr, VmPerms::WRITE);
    assert!(process.is_zombie());
    assert_eq!(process.exit_code(), Some(Errno::EFAULT as i32));
}
