// SPDX-License-Identifier: MPL-2.0

use super::{Pid, Process};

/// Which children a `waitpid` call is interested in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessFilter {
    /// Any child.
    Any,
    /// The child with this pid.
    WithPid(Pid),
}

impl ProcessFilter {
    pub fn matches(&self, process: &Process) -> bool {
        match self {
            ProcessFilter::Any => true,
            ProcessFilter::WithPid(pid) => process.pid() == *pid,
        }
    }
}
