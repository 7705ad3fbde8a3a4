#![allow(dead_code)]

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;

pub mod free_space;
pub mod page;
pub mod record;
pub mod record_manager;
pub mod scan;
pub mod test_utils;

pub use page::{PageError, Slot, SlottedPage, SLOT_SIZE, TRAILER_SIZE};
pub use record::{AttrType, Attribute, Value};
pub use record_manager::{RecordFile, RecordFileManager, MAX_FORWARD_HOPS};
pub use scan::{CompOp, Predicate, RecordScan};
pub use test_utils::TestDir;

pub const DEFAULT_PAGE_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("file already exists: {0}")]
    AlreadyExists(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("file is not open")]
    NotOpen,
    #[error("page {0} is out of range")]
    PageOutOfRange(u32),
    #[error("no record at page {}, slot {}", .0.page_num, .0.slot_num)]
    RecordNotFound(Rid),
    #[error("attribute not found: {0}")]
    AttributeNotFound(String),
    #[error("malformed record data")]
    MalformedRecord,
    #[error("tombstone chain exceeded {0} hops")]
    TombstoneLoop(u32),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Stable external identifier of a record. Survives relocation: an update
/// that moves the record leaves a forwarding tombstone at the original slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub page_num: u32,
    pub slot_num: u16,
}

impl Rid {
    pub fn new(page_num: u32, slot_num: u16) -> Self {
        Self { page_num, slot_num }
    }
}

// Byte offsets of the four counters stored in the metadata page.
const META_NUM_PAGES_OFFSET: u64 = 0;
const META_READ_COUNT_OFFSET: u64 = 4;
const META_WRITE_COUNT_OFFSET: u64 = 8;
const META_APPEND_COUNT_OFFSET: u64 = 12;

/// The file manager that creates, destroys and opens paged files inside its
/// database directory. The page size is fixed when a file is created and must
/// match when the file is reopened.
pub struct FileManager {
    db_directory: PathBuf,
    page_size: usize,
}

impl FileManager {
    pub fn new<P>(db_directory: P, page_size: usize) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let db_path = db_directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&db_path)?;
        Ok(Self {
            db_directory: db_path,
            page_size,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.db_directory.join(name)
    }

    /// Create a new paged file holding only a zeroed metadata page.
    pub fn create_file(&self, name: &str) -> Result<(), StorageError> {
        let path = self.file_path(name);
        if path.exists() {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        let mut file = File::create(&path)?;
        file.write_all(&vec![0u8; self.page_size])?;
        file.flush()?;
        Ok(())
    }

    pub fn destroy_file(&self, name: &str) -> Result<(), StorageError> {
        let path = self.file_path(name);
        if !path.exists() {
            return Err(StorageError::FileNotFound(name.to_string()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Open an existing file, restoring the page count and I/O counters from
    /// its metadata page.
    pub fn open_file(&self, name: &str) -> Result<FileHandle, StorageError> {
        let path = self.file_path(name);
        if !path.exists() {
            return Err(StorageError::FileNotFound(name.to_string()));
        }
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut meta = [0u8; 16];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut meta)?;
        Ok(FileHandle {
            file: Some(file),
            page_size: self.page_size,
            num_pages: read_meta_u32(&meta, META_NUM_PAGES_OFFSET),
            read_count: read_meta_u32(&meta, META_READ_COUNT_OFFSET),
            write_count: read_meta_u32(&meta, META_WRITE_COUNT_OFFSET),
            append_count: read_meta_u32(&meta, META_APPEND_COUNT_OFFSET),
        })
    }

    pub fn close_file(&self, handle: &mut FileHandle) -> Result<(), StorageError> {
        handle.close()
    }
}

fn read_meta_u32(meta: &[u8; 16], offset: u64) -> u32 {
    let start = offset as usize;
    let bytes: [u8; 4] = meta[start..start + 4].try_into().unwrap();
    u32::from_le_bytes(bytes)
}

/// An open paged file. Logical page `n` lives at physical page `n + 1`;
/// physical page 0 is reserved for the metadata counters and is never exposed
/// as a data page. Every mutation is flushed before the call returns.
pub struct FileHandle {
    file: Option<File>,
    page_size: usize,
    num_pages: u32,
    read_count: u32,
    write_count: u32,
    append_count: u32,
}

impl FileHandle {
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Current `(read, write, append)` counter values.
    pub fn io_counters(&self) -> (u32, u32, u32) {
        (self.read_count, self.write_count, self.append_count)
    }

    /// Flush and release the underlying descriptor. Any page operation
    /// afterwards fails with `NotOpen`.
    pub fn close(&mut self) -> Result<(), StorageError> {
        let mut file = self.file.take().ok_or(StorageError::NotOpen)?;
        file.flush()?;
        Ok(())
    }

    fn physical_offset(&self, page_num: u32) -> u64 {
        // + 1 skips the metadata page
        (page_num as u64 + 1) * self.page_size as u64
    }

    /// Read logical page `page_num` into `buf`.
    pub fn read_page(&mut self, page_num: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        if page_num >= self.num_pages {
            return Err(StorageError::PageOutOfRange(page_num));
        }
        debug_assert_eq!(buf.len(), self.page_size);
        let offset = self.physical_offset(page_num);
        let file = self.file.as_mut().ok_or(StorageError::NotOpen)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf[..])?;
        self.read_count += 1;
        self.write_meta_u32(META_READ_COUNT_OFFSET, self.read_count)?;
        Ok(())
    }

    /// Overwrite logical page `page_num` with `buf` and flush.
    pub fn write_page(&mut self, page_num: u32, buf: &[u8]) -> Result<(), StorageError> {
        if page_num >= self.num_pages {
            return Err(StorageError::PageOutOfRange(page_num));
        }
        debug_assert_eq!(buf.len(), self.page_size);
        let offset = self.physical_offset(page_num);
        let file = self.file.as_mut().ok_or(StorageError::NotOpen)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.flush()?;
        self.write_count += 1;
        self.write_meta_u32(META_WRITE_COUNT_OFFSET, self.write_count)?;
        Ok(())
    }

    /// Write `buf` as a new logical page at the end of the file.
    pub fn append_page(&mut self, buf: &[u8]) -> Result<(), StorageError> {
        debug_assert_eq!(buf.len(), self.page_size);
        let file = self.file.as_mut().ok_or(StorageError::NotOpen)?;
        file.seek(SeekFrom::End(0))?;
        file.write_all(buf)?;
        file.flush()?;
        self.append_count += 1;
        self.write_meta_u32(META_APPEND_COUNT_OFFSET, self.append_count)?;
        self.num_pages += 1;
        self.write_meta_u32(META_NUM_PAGES_OFFSET, self.num_pages)?;
        Ok(())
    }

    fn write_meta_u32(&mut self, offset: u64, value: u32) -> Result<(), StorageError> {
        let file = self.file.as_mut().ok_or(StorageError::NotOpen)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&value.to_le_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod paged_file_tests {
    use super::*;
    use crate::test_utils::unique_test_dir;

    fn setup(page_size: usize) -> (TestDir, FileManager) {
        let dir = unique_test_dir("paged_file");
        let file_manager = FileManager::new(&dir, page_size).unwrap();
        (dir, file_manager)
    }

    #[test]
    fn create_fails_when_file_exists() {
        let (_dir, fm) = setup(256);
        fm.create_file("data").unwrap();
        assert!(matches!(
            fm.create_file("data"),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn destroy_fails_when_file_missing() {
        let (_dir, fm) = setup(256);
        assert!(matches!(
            fm.destroy_file("missing"),
            Err(StorageError::FileNotFound(_))
        ));
        fm.create_file("data").unwrap();
        fm.destroy_file("data").unwrap();
        assert!(matches!(
            fm.open_file("data"),
            Err(StorageError::FileNotFound(_))
        ));
    }

    #[test]
    fn new_file_has_no_pages_and_zero_counters() {
        let (_dir, fm) = setup(256);
        fm.create_file("data").unwrap();
        let handle = fm.open_file("data").unwrap();
        assert_eq!(handle.num_pages(), 0);
        assert_eq!(handle.io_counters(), (0, 0, 0));
    }

    #[test]
    fn append_write_read_round_trip() {
        let (_dir, fm) = setup(256);
        fm.create_file("data").unwrap();
        let mut handle = fm.open_file("data").unwrap();

        let page_a = vec![0xAB; 256];
        handle.append_page(&page_a).unwrap();
        assert_eq!(handle.num_pages(), 1);

        let mut buf = vec![0u8; 256];
        handle.read_page(0, &mut buf).unwrap();
        assert_eq!(buf, page_a);

        let page_b = vec![0xCD; 256];
        handle.write_page(0, &page_b).unwrap();
        handle.read_page(0, &mut buf).unwrap();
        assert_eq!(buf, page_b);

        assert_eq!(handle.io_counters(), (2, 1, 1));
    }

    #[test]
    fn read_and_write_out_of_range() {
        let (_dir, fm) = setup(256);
        fm.create_file("data").unwrap();
        let mut handle = fm.open_file("data").unwrap();
        let mut buf = vec![0u8; 256];
        assert!(matches!(
            handle.read_page(0, &mut buf),
            Err(StorageError::PageOutOfRange(0))
        ));
        assert!(matches!(
            handle.write_page(0, &buf),
            Err(StorageError::PageOutOfRange(0))
        ));
    }

    #[test]
    fn counters_survive_reopen() {
        let (_dir, fm) = setup(256);
        fm.create_file("data").unwrap();
        let mut handle = fm.open_file("data").unwrap();
        let page = vec![7u8; 256];
        handle.append_page(&page).unwrap();
        handle.append_page(&page).unwrap();
        let mut buf = vec![0u8; 256];
        handle.read_page(1, &mut buf).unwrap();
        handle.write_page(0, &page).unwrap();
        handle.close().unwrap();

        let reopened = fm.open_file("data").unwrap();
        assert_eq!(reopened.num_pages(), 2);
        assert_eq!(reopened.io_counters(), (1, 1, 2));
    }

    #[test]
    fn close_twice_is_not_open() {
        let (_dir, fm) = setup(256);
        fm.create_file("data").unwrap();
        let mut handle = fm.open_file("data").unwrap();
        handle.close().unwrap();
        assert!(matches!(handle.close(), Err(StorageError::NotOpen)));
        let buf = vec![0u8; 256];
        assert!(matches!(
            handle.append_page(&buf),
            Err(StorageError::NotOpen)
        ));
    }
}

fn main() {}
