// SPDX-License-Identifier: MPL-2.0

//! The slice of the file system this kernel core needs: vnodes with
//! page-granular I/O, and per-process file tables.
//!
//! Name resolution and the on-disk file system are external
//! collaborators; vnodes here are created directly by whoever owns
//! them (in practice, the tests and the boot path).

mod file_table;
mod ram;
mod vnode;

pub use self::{
    file_table::{AccessMode, File, FileTable, SeekFrom, MAX_OPEN_FILES},
    ram::RamVnode,
    vnode::Vnode,
};
