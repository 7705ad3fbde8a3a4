use crate::free_space::FreeSpaceMap;
use crate::page::{Slot, SlottedPage, SLOT_SIZE};
use crate::record::{self, Attribute};
use crate::scan::{Predicate, RecordScan};
use crate::{FileHandle, FileManager, Rid, StorageError};

/// Forwarding hops followed before a tombstone chain is treated as a cycle.
/// Chains longer than one hop only arise when a relocated record is itself
/// relocated again.
pub const MAX_FORWARD_HOPS: u32 = 16;

/// How a slot's `{offset, length}` entry is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Empty,
    Live,
    Forward(Rid),
}

pub(crate) fn classify(slot: Slot, marker: u16) -> SlotKind {
    if slot.length == 0 {
        SlotKind::Empty
    } else if slot.length >= marker {
        SlotKind::Forward(Rid::new(
            slot.offset.saturating_sub(marker) as u32,
            slot.length - marker,
        ))
    } else {
        SlotKind::Live
    }
}

pub(crate) fn load_page(
    handle: &mut FileHandle,
    page_num: u32,
) -> Result<SlottedPage, StorageError> {
    let mut buf = vec![0u8; handle.page_size()];
    handle.read_page(page_num, &mut buf)?;
    Ok(SlottedPage::from_bytes(buf))
}

/// An open record file: the paged-file handle plus the free-space index built
/// for it. Both live and die together, so closing the file discards the
/// index with it.
pub struct RecordFile {
    pub(crate) handle: FileHandle,
    pub(crate) free_space: FreeSpaceMap,
}

impl RecordFile {
    pub fn num_pages(&self) -> u32 {
        self.handle.num_pages()
    }

    pub fn io_counters(&self) -> (u32, u32, u32) {
        self.handle.io_counters()
    }
}

/// The record manager: variable-length, schema-described records stored in
/// slotted pages, addressed by stable RIDs. Wraps a `FileManager` for the
/// page I/O; one instance per database directory, independently
/// constructible.
pub struct RecordFileManager {
    file_manager: FileManager,
}

impl RecordFileManager {
    pub fn new(file_manager: FileManager) -> Self {
        Self { file_manager }
    }

    pub fn page_size(&self) -> usize {
        self.file_manager.page_size()
    }

    pub fn create_file(&self, name: &str) -> Result<(), StorageError> {
        self.file_manager.create_file(name)
    }

    pub fn destroy_file(&self, name: &str) -> Result<(), StorageError> {
        self.file_manager.destroy_file(name)
    }

    /// Open a record file, seeding its free-space index from every page
    /// trailer.
    pub fn open_file(&self, name: &str) -> Result<RecordFile, StorageError> {
        let mut handle = self.file_manager.open_file(name)?;
        let mut free_space = FreeSpaceMap::new();
        for page_num in 0..handle.num_pages() {
            let page = load_page(&mut handle, page_num)?;
            free_space.note(page_num, page.free_space());
        }
        Ok(RecordFile { handle, free_space })
    }

    pub fn close_file(&self, mut file: RecordFile) -> Result<(), StorageError> {
        file.handle.close()
    }

    /// Insert a wire-format record, returning its RID. Picks the most-free
    /// page with room for the record plus a directory entry; appends a fresh
    /// page when no page qualifies.
    pub fn insert_record(
        &self,
        file: &mut RecordFile,
        fields: &[Attribute],
        data: &[u8],
    ) -> Result<Rid, StorageError> {
        let len = record::record_size(fields, data)?;
        let record = &data[..len];
        match file.free_space.best_candidate(len + SLOT_SIZE) {
            Some(page_num) => {
                let mut page = load_page(&mut file.handle, page_num)?;
                let slot_num = page.insert(record)?;
                file.handle.write_page(page_num, page.as_bytes())?;
                file.free_space.note(page_num, page.free_space());
                Ok(Rid::new(page_num, slot_num))
            }
            None => {
                let mut page = SlottedPage::new(self.page_size());
                let slot_num = page.insert(record)?;
                let page_num = file.handle.num_pages();
                file.handle.append_page(page.as_bytes())?;
                file.free_space.note(page_num, page.free_space());
                Ok(Rid::new(page_num, slot_num))
            }
        }
    }

    /// Follow the forwarding chain from `rid` to the slot holding the actual
    /// record bytes. Returns the final location and its loaded page.
    fn resolve(
        &self,
        file: &mut RecordFile,
        rid: Rid,
    ) -> Result<(Rid, SlottedPage), StorageError> {
        let mut cur = rid;
        for _ in 0..MAX_FORWARD_HOPS {
            let page = load_page(&mut file.handle, cur.page_num)?;
            let slot = page
                .read_slot(cur.slot_num)
                .ok_or(StorageError::RecordNotFound(cur))?;
            match classify(slot, page.tombstone_marker()) {
                SlotKind::Empty => return Err(StorageError::RecordNotFound(cur)),
                SlotKind::Live => return Ok((cur, page)),
                SlotKind::Forward(next) => cur = next,
            }
        }
        Err(StorageError::TombstoneLoop(MAX_FORWARD_HOPS))
    }

    /// Read back the exact bytes stored for `rid`, transparently following
    /// tombstones.
    pub fn read_record(&self, file: &mut RecordFile, rid: Rid) -> Result<Vec<u8>, StorageError> {
        let (location, page) = self.resolve(file, rid)?;
        page.record_bytes(location.slot_num)
            .map(|bytes| bytes.to_vec())
            .ok_or(StorageError::MalformedRecord)
    }

    /// Delete the record at `rid`, reclaiming the forwarding slots along the
    /// chain as well as the record bytes at its end.
    pub fn delete_record(&self, file: &mut RecordFile, rid: Rid) -> Result<(), StorageError> {
        let mut cur = rid;
        for _ in 0..MAX_FORWARD_HOPS {
            let mut page = load_page(&mut file.handle, cur.page_num)?;
            let slot = page
                .read_slot(cur.slot_num)
                .ok_or(StorageError::RecordNotFound(cur))?;
            match classify(slot, page.tombstone_marker()) {
                SlotKind::Empty => return Err(StorageError::RecordNotFound(cur)),
                SlotKind::Live => {
                    page.delete(cur.slot_num)?;
                    file.handle.write_page(cur.page_num, page.as_bytes())?;
                    file.free_space.note(cur.page_num, page.free_space());
                    return Ok(());
                }
                SlotKind::Forward(next) => {
                    // reclaim the forwarding slot itself, then follow it
                    page.clear_slot(cur.slot_num)?;
                    file.handle.write_page(cur.page_num, page.as_bytes())?;
                    cur = next;
                }
            }
        }
        Err(StorageError::TombstoneLoop(MAX_FORWARD_HOPS))
    }

    /// Replace the record at `rid` with new data. The RID the caller holds
    /// stays valid: shrinking rewrites in place, growing first tries the end
    /// of the same page (keeping the slot number), and only then relocates,
    /// leaving a forwarding tombstone behind.
    pub fn update_record(
        &self,
        file: &mut RecordFile,
        fields: &[Attribute],
        rid: Rid,
        data: &[u8],
    ) -> Result<(), StorageError> {
        let new_len = record::record_size(fields, data)?;
        let record = &data[..new_len];
        let (location, mut page) = self.resolve(file, rid)?;
        let old_len = page
            .read_slot(location.slot_num)
            .map(|slot| slot.length as usize)
            .ok_or(StorageError::RecordNotFound(location))?;

        if new_len <= old_len {
            page.replace_in_place(location.slot_num, record)?;
            file.handle.write_page(location.page_num, page.as_bytes())?;
            file.free_space.note(location.page_num, page.free_space());
            return Ok(());
        }

        // Growing: reclaim the old bytes first, then prefer the same page
        // (same slot, so the RID needs no forwarding) over relocation.
        page.delete(location.slot_num)?;
        if page.free_space() as usize >= new_len {
            page.place_in_slot(location.slot_num, record)?;
            file.handle.write_page(location.page_num, page.as_bytes())?;
            file.free_space.note(location.page_num, page.free_space());
            return Ok(());
        }
        file.handle.write_page(location.page_num, page.as_bytes())?;
        file.free_space.note(location.page_num, page.free_space());

        // The insert cannot land on `location`'s page: its free space was
        // just found insufficient, so the candidate search skips it.
        let new_rid = self.insert_record(file, fields, record)?;
        let mut page = load_page(&mut file.handle, location.page_num)?;
        page.write_tombstone(location.slot_num, new_rid.page_num, new_rid.slot_num)?;
        file.handle.write_page(location.page_num, page.as_bytes())?;
        Ok(())
    }

    /// Read a single attribute of the record at `rid`. Returns
    /// `(is_null, value_bytes)`.
    pub fn read_attribute(
        &self,
        file: &mut RecordFile,
        fields: &[Attribute],
        rid: Rid,
        attribute_name: &str,
    ) -> Result<(bool, Vec<u8>), StorageError> {
        let record = self.read_record(file, rid)?;
        record::read_field(fields, attribute_name, &record)
    }

    /// Open a single-pass cursor over every live record of the file. See
    /// `RecordScan` for predicate and projection semantics.
    pub fn scan<'a>(
        &self,
        file: &'a mut RecordFile,
        fields: Vec<Attribute>,
        predicate: Option<Predicate>,
        projection: Vec<String>,
    ) -> RecordScan<'a> {
        RecordScan::new(file, fields, predicate, projection)
    }
}
