// SPDX-License-Identifier: MPL-2.0

//! The minimal kernel-thread model.
//!
//! A thread is a saved user context bound to a process. The real
//! scheduler is an external collaborator; what this core needs is the
//! ability to create the forked child's thread with the right saved
//! registers and hand it over for scheduling.

use minos_frame::cpu::UserContext;

use crate::{prelude::*, process::Process};

/// A kernel thread: the unit of scheduling.
pub struct Thread {
    process: Weak<Process>,
    user_ctx: Mutex<UserContext>,
}

impl Thread {
    pub fn new(process: &Arc<Process>, user_ctx: UserContext) -> Arc<Self> {
        Arc::new(Self {
            process: Arc::downgrade(process),
            user_ctx: Mutex::new(user_ctx),
        })
    }

    /// The process this thread belongs to, if it still exists.
    pub fn process(&self) -> Option<Arc<Process>> {
        self.process.upgrade()
    }

    /// A copy of the thread's saved user context.
    pub fn user_ctx(&self) -> UserContext {
        *self.user_ctx.lock()
    }
}

static RUN_QUEUE: Mutex<VecDeque<Arc<Thread>>> = Mutex::new(VecDeque::new());

/// Hands a thread to the scheduler.
pub fn submit(thread: Arc<Thread>) {
    RUN_QUEUE.lock().push_back(thread);
}

/// Takes the next runnable thread, if any.
pub fn take_runnable() -> Option<Arc<Thread>> {
    RUN_QUEUE.lock().pop_front()
}
