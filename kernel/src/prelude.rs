// SPDX-License-Identifier: MPL-2.0

//! The crate-internal prelude.

#![allow(unused)]

pub(crate) use alloc::{
    boxed::Box,
    collections::{BTreeMap, BTreeSet, VecDeque},
    string::{String, ToString},
    sync::{Arc, Weak},
    vec,
    vec::Vec,
};
pub(crate) use core::ops::Range;

pub(crate) use bitflags::bitflags;
pub(crate) use log::{debug, error, info, trace, warn};
pub(crate) use minos_frame::{
    config::PAGE_SIZE,
    sync::{Mutex, MutexGuard, Once, RwLock},
    vm::Vaddr,
};

pub(crate) use crate::{
    error::{Errno, Error},
    return_errno, return_errno_with_message,
};

pub(crate) type Result<T> = core::result::Result<T, Error>;
