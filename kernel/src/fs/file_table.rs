// SPDX-License-Identifier: MPL-2.0

use super::vnode::Vnode;
use crate::prelude::*;

/// The largest number of open files per process.
pub const MAX_OPEN_FILES: usize = 32;

/// How an open file may be accessed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn is_readable(&self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// The position argument of `lseek`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekFrom {
    Start(usize),
    Current(isize),
    End(isize),
}

/// An open file: a vnode, a cursor, and an access mode.
///
/// Shared between processes after fork; the cursor is shared too, as
/// POSIX prescribes.
pub struct File {
    vnode: Arc<dyn Vnode>,
    offset: Mutex<usize>,
    access_mode: AccessMode,
}

impl File {
    pub fn new(vnode: Arc<dyn Vnode>, access_mode: AccessMode) -> Arc<Self> {
        Arc::new(Self {
            vnode,
            offset: Mutex::new(0),
            access_mode,
        })
    }

    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.vnode
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Reads from the cursor, advancing it by the bytes read.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.access_mode.is_readable() {
            return_errno_with_message!(Errno::EBADF, "file is not open for reading");
        }
        let mut offset = self.offset.lock();
        let read = self.vnode.clone().read_at(*offset, buf)?;
        *offset += read;
        Ok(read)
    }

    /// Writes at the cursor, advancing it by the bytes written.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if !self.access_mode.is_writable() {
            return_errno_with_message!(Errno::EBADF, "file is not open for writing");
        }
        let mut offset = self.offset.lock();
        let written = self.vnode.clone().write_at(*offset, buf)?;
        *offset += written;
        Ok(written)
    }

    /// Repositions the cursor, returning the new offset.
    pub fn seek(&self, pos: SeekFrom) -> Result<usize> {
        let mut offset = self.offset.lock();
        let new_offset = match pos {
            SeekFrom::Start(off) => Some(off),
            SeekFrom::Current(delta) => offset.checked_add_signed(delta),
            SeekFrom::End(delta) => self.vnode.size().checked_add_signed(delta),
        };
        let Some(new_offset) = new_offset else {
            return_errno_with_message!(Errno::EINVAL, "seek before the start of the file");
        };
        *offset = new_offset;
        Ok(new_offset)
    }
}

/// The per-process table of open files.
pub struct FileTable {
    table: Vec<Option<Arc<File>>>,
}

impl FileTable {
    pub const fn new() -> Self {
        Self { table: Vec::new() }
    }

    /// Installs a file at the lowest free descriptor.
    pub fn install(&mut self, file: Arc<File>) -> Result<usize> {
        if let Some(fd) = self.table.iter().position(|slot| slot.is_none()) {
            self.table[fd] = Some(file);
            return Ok(fd);
        }
        if self.table.len() >= MAX_OPEN_FILES {
            return_errno_with_message!(Errno::EMFILE, "file table is full");
        }
        self.table.push(Some(file));
        Ok(self.table.len() - 1)
    }

    /// Returns the file open at `fd`.
    pub fn get(&self, fd: usize) -> Result<Arc<File>> {
        self.table
            .get(fd)
            .and_then(|slot| slot.clone())
            .ok_or(Error::with_message(Errno::EBADF, "bad file descriptor"))
    }

    /// Closes `fd`, returning the file that was open there.
    pub fn close(&mut self, fd: usize) -> Result<Arc<File>> {
        self.table
            .get_mut(fd)
            .and_then(|slot| slot.take())
            .ok_or(Error::with_message(Errno::EBADF, "bad file descriptor"))
    }

    /// Duplicates `fd` onto the lowest free descriptor.
    pub fn dup(&mut self, fd: usize) -> Result<usize> {
        let file = self.get(fd)?;
        self.install(file)
    }

    /// Duplicates `old_fd` onto exactly `new_fd`, closing whatever was
    /// open there.
    pub fn dup2(&mut self, old_fd: usize, new_fd: usize) -> Result<usize> {
        let file = self.get(old_fd)?;
        if new_fd >= MAX_OPEN_FILES {
            return_errno_with_message!(Errno::EBADF, "descriptor out of range");
        }
        if old_fd == new_fd {
            return Ok(new_fd);
        }
        if self.table.len() <= new_fd {
            self.table.resize(new_fd + 1, None);
        }
        self.table[new_fd] = Some(file);
        Ok(new_fd)
    }

    /// The number of open descriptors.
    pub fn count(&self) -> usize {
        self.table.iter().filter(|slot| slot.is_some()).count()
    }
}

impl Clone for FileTable {
    /// Duplicates the table for fork: both processes share every open
    /// file (and its cursor), each holding its own reference.
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
        }
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RamVnode;

    fn open_file(mode: AccessMode) -> Arc<File> {
        File::new(RamVnode::with_contents(b"hello world"), mode)
    }

    #[test]
    fn test_install_uses_lowest_free_fd() {
        let mut table = FileTable::new();
        let fd0 = table.install(open_file(AccessMode::ReadOnly)).unwrap();
        let fd1 = table.install(open_file(AccessMode::ReadOnly)).unwrap();
        assert_eq!((fd0, fd1), (0, 1));

        table.close(fd0).unwrap();
        let fd = table.install(open_file(AccessMode::ReadOnly)).unwrap();
        assert_eq!(fd, 0);
    }

    #[test]
    fn test_read_advances_cursor() {
        let file = open_file(AccessMode::ReadOnly);
        let mut buf = [0u8; 5];
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b" worl");
    }

    #[test]
    fn test_write_requires_write_mode() {
        let file = open_file(AccessMode::ReadOnly);
        let err = file.write(b"nope").unwrap_err();
        assert_eq!(err.error(), Errno::EBADF);
    }

    #[test]
    fn test_seek_whences() {
        let file = open_file(AccessMode::ReadOnly);
        assert_eq!(file.seek(SeekFrom::Start(6)).unwrap(), 6);
        assert_eq!(file.seek(SeekFrom::Current(-2)).unwrap(), 4);
        assert_eq!(file.seek(SeekFrom::End(-1)).unwrap(), 10);
        assert!(file.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn test_dup2_replaces_target() {
        let mut table = FileTable::new();
        let fd0 = table.install(open_file(AccessMode::ReadOnly)).unwrap();
        table.dup2(fd0, 7).unwrap();
        assert!(Arc::ptr_eq(&table.get(fd0).unwrap(), &table.get(7).unwrap()));
        assert_eq!(table.count(), 2);
    }

    #[test]
    fn test_table_overflow_is_emfile() {
        let mut table = FileTable::new();
        for _ in 0..MAX_OPEN_FILES {
            table.install(open_file(AccessMode::ReadOnly)).unwrap();
        }
        let err = table.install(open_file(AccessMode::ReadOnly)).unwrap_err();
        assert_eq!(err.error(), Errno::EMFILE);
    }
}
