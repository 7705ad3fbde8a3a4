use thiserror::Error;

/// Size of one slot directory entry: `{offset: u16, length: u16}`.
pub const SLOT_SIZE: usize = 4;
/// Size of the page trailer: `num_slots: u16` then `free_space: u16`.
pub const TRAILER_SIZE: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PageError {
    #[error("slot {0} is out of range for this page")]
    SlotOutOfRange(u16),
    #[error("slot {0} is empty")]
    EmptySlot(u16),
    #[error("slot {0} is occupied")]
    SlotOccupied(u16),
    #[error("not enough free space in page")]
    InsufficientSpace,
    #[error("record does not fit in a page")]
    RecordTooLarge,
    #[error("forwarding target does not fit in a slot entry")]
    ForwardOutOfRange,
}

/// Raw slot directory entry. The `length` field is an overlay: `0` marks an
/// empty slot, values below the tombstone marker are live record lengths, and
/// values at or above it re-interpret the entry as a forwarding pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub offset: u16,
    pub length: u16,
}

/// One page's worth of bytes laid out as a slotted page:
///
/// ```text
/// [ record heap --> ...free... <-- slot dir | num_slots | free_space ]
/// 0                                                               P-4   P-2
/// ```
///
/// The heap grows from byte 0, the directory grows leftward from the trailer
/// with slot 1 closest to it. Slot numbers are 1-based and never reused for a
/// different position: `num_slots` only grows.
pub struct SlottedPage {
    buf: Vec<u8>,
}

impl SlottedPage {
    /// A fresh page with an empty directory and maximal free space.
    pub fn new(page_size: usize) -> Self {
        let mut page = Self {
            buf: vec![0; page_size],
        };
        page.set_free_space((page_size - TRAILER_SIZE) as u16);
        page
    }

    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn page_size(&self) -> usize {
        self.buf.len()
    }

    /// Slot lengths at or above this value encode forwarding pointers. The
    /// page size itself is used: no in-page offset or record length can reach
    /// it, so the two interpretations never collide.
    pub fn tombstone_marker(&self) -> u16 {
        self.buf.len() as u16
    }

    fn get_u16(&self, pos: usize) -> u16 {
        u16::from_le_bytes([self.buf[pos], self.buf[pos + 1]])
    }

    fn set_u16(&mut self, pos: usize, value: u16) {
        self.buf[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn num_slots(&self) -> u16 {
        self.get_u16(self.buf.len() - TRAILER_SIZE)
    }

    fn set_num_slots(&mut self, num_slots: u16) {
        let pos = self.buf.len() - TRAILER_SIZE;
        self.set_u16(pos, num_slots);
    }

    pub fn free_space(&self) -> u16 {
        self.get_u16(self.buf.len() - 2)
    }

    fn set_free_space(&mut self, free_space: u16) {
        let pos = self.buf.len() - 2;
        self.set_u16(pos, free_space);
    }

    fn slot_pos(&self, slot_num: u16) -> usize {
        self.buf.len() - TRAILER_SIZE - SLOT_SIZE * slot_num as usize
    }

    /// First byte past the record heap.
    fn heap_end(&self) -> usize {
        self.buf.len()
            - TRAILER_SIZE
            - SLOT_SIZE * self.num_slots() as usize
            - self.free_space() as usize
    }

    /// Raw decode of a slot entry. Interpretation of the length overlay
    /// (empty / live / tombstone) is the record manager's job.
    pub fn read_slot(&self, slot_num: u16) -> Option<Slot> {
        if slot_num == 0 || slot_num > self.num_slots() {
            return None;
        }
        let pos = self.slot_pos(slot_num);
        Some(Slot {
            offset: self.get_u16(pos),
            length: self.get_u16(pos + 2),
        })
    }

    fn set_slot(&mut self, slot_num: u16, slot: Slot) {
        let pos = self.slot_pos(slot_num);
        self.set_u16(pos, slot.offset);
        self.set_u16(pos + 2, slot.length);
    }

    fn first_empty_slot(&self) -> Option<u16> {
        (1..=self.num_slots()).find(|&s| {
            self.read_slot(s)
                .map(|slot| slot.length == 0)
                .unwrap_or(false)
        })
    }

    /// Bytes of the live record in `slot_num`, bounds-checked against the
    /// page. `None` for out-of-range, empty or tombstone slots.
    pub fn record_bytes(&self, slot_num: u16) -> Option<&[u8]> {
        let slot = self.read_slot(slot_num)?;
        if slot.length == 0 || slot.length >= self.tombstone_marker() {
            return None;
        }
        let start = slot.offset as usize;
        let end = start + slot.length as usize;
        if end > self.heap_end() {
            return None;
        }
        Some(&self.buf[start..end])
    }

    /// Insert a record, reusing the lowest-numbered empty slot if one exists,
    /// otherwise allocating a new directory entry. Returns the slot number.
    pub fn insert(&mut self, record: &[u8]) -> Result<u16, PageError> {
        if record.len() >= self.tombstone_marker() as usize {
            return Err(PageError::RecordTooLarge);
        }
        match self.first_empty_slot() {
            Some(slot_num) => {
                if (self.free_space() as usize) < record.len() {
                    return Err(PageError::InsufficientSpace);
                }
                self.place_in_slot(slot_num, record)?;
                Ok(slot_num)
            }
            None => {
                if (self.free_space() as usize) < record.len() + SLOT_SIZE {
                    return Err(PageError::InsufficientSpace);
                }
                let slot_num = self.num_slots() + 1;
                self.set_num_slots(slot_num);
                self.set_free_space(self.free_space() - SLOT_SIZE as u16);
                // the new entry may land on stale heap bytes
                self.set_slot(slot_num, Slot { offset: 0, length: 0 });
                self.place_in_slot(slot_num, record)?;
                Ok(slot_num)
            }
        }
    }

    /// Place a record into an existing empty slot, appending its bytes at the
    /// end of the heap. Used by `insert` and by same-page relocation on
    /// update, where the slot number must be preserved.
    pub fn place_in_slot(&mut self, slot_num: u16, record: &[u8]) -> Result<(), PageError> {
        let slot = self
            .read_slot(slot_num)
            .ok_or(PageError::SlotOutOfRange(slot_num))?;
        if slot.length != 0 {
            return Err(PageError::SlotOccupied(slot_num));
        }
        if (self.free_space() as usize) < record.len() {
            return Err(PageError::InsufficientSpace);
        }
        let heap_end = self.heap_end();
        self.buf[heap_end..heap_end + record.len()].copy_from_slice(record);
        self.set_slot(
            slot_num,
            Slot {
                offset: heap_end as u16,
                length: record.len() as u16,
            },
        );
        self.set_free_space(self.free_space() - record.len() as u16);
        Ok(())
    }

    /// Remove the record in `slot_num`, compacting the heap: every byte after
    /// the hole shifts left and every live slot beyond it has its offset
    /// pulled back. The slot itself is zeroed for reuse; `num_slots` never
    /// shrinks so other slot numbers stay stable.
    pub fn delete(&mut self, slot_num: u16) -> Result<(), PageError> {
        let slot = self
            .read_slot(slot_num)
            .ok_or(PageError::SlotOutOfRange(slot_num))?;
        if slot.length == 0 {
            return Err(PageError::EmptySlot(slot_num));
        }
        debug_assert!(slot.length < self.tombstone_marker());
        let len = slot.length as usize;
        let start = slot.offset as usize;
        let heap_end = self.heap_end();
        self.buf.copy_within(start + len..heap_end, start);
        self.shift_offsets_above(slot.offset, slot.length);
        self.set_slot(slot_num, Slot { offset: 0, length: 0 });
        self.set_free_space(self.free_space() + slot.length);
        Ok(())
    }

    /// Zero a slot entry without touching the heap. For tombstone slots,
    /// which own no record bytes.
    pub fn clear_slot(&mut self, slot_num: u16) -> Result<(), PageError> {
        if self.read_slot(slot_num).is_none() {
            return Err(PageError::SlotOutOfRange(slot_num));
        }
        self.set_slot(slot_num, Slot { offset: 0, length: 0 });
        Ok(())
    }

    /// Overwrite a live record with a same-size-or-smaller one, compacting
    /// the reclaimed tail bytes immediately.
    pub fn replace_in_place(&mut self, slot_num: u16, record: &[u8]) -> Result<(), PageError> {
        let slot = self
            .read_slot(slot_num)
            .ok_or(PageError::SlotOutOfRange(slot_num))?;
        if slot.length == 0 {
            return Err(PageError::EmptySlot(slot_num));
        }
        debug_assert!(slot.length < self.tombstone_marker());
        let old_len = slot.length as usize;
        if record.len() > old_len {
            return Err(PageError::RecordTooLarge);
        }
        let start = slot.offset as usize;
        let delta = (old_len - record.len()) as u16;
        let heap_end = self.heap_end();
        self.buf[start..start + record.len()].copy_from_slice(record);
        self.buf
            .copy_within(start + old_len..heap_end, start + record.len());
        self.shift_offsets_above(slot.offset, delta);
        self.set_slot(
            slot_num,
            Slot {
                offset: slot.offset,
                length: record.len() as u16,
            },
        );
        self.set_free_space(self.free_space() + delta);
        Ok(())
    }

    /// Turn a (previously emptied) slot into a forwarding pointer to
    /// `(target_page, target_slot)`. Does not touch the heap or free space.
    pub fn write_tombstone(
        &mut self,
        slot_num: u16,
        target_page: u32,
        target_slot: u16,
    ) -> Result<(), PageError> {
        if self.read_slot(slot_num).is_none() {
            return Err(PageError::SlotOutOfRange(slot_num));
        }
        let marker = self.tombstone_marker() as u32;
        let offset = target_page
            .checked_add(marker)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or(PageError::ForwardOutOfRange)?;
        let length = target_slot
            .checked_add(marker as u16)
            .ok_or(PageError::ForwardOutOfRange)?;
        self.set_slot(
            slot_num,
            Slot {
                offset,
                length,
            },
        );
        Ok(())
    }

    /// Pull back the offset of every live slot past a compacted hole.
    fn shift_offsets_above(&mut self, hole_offset: u16, by: u16) {
        let marker = self.tombstone_marker();
        for s in 1..=self.num_slots() {
            let pos = self.slot_pos(s);
            let offset = self.get_u16(pos);
            let length = self.get_u16(pos + 2);
            // empty and tombstone entries do not address the heap
            if length == 0 || length >= marker {
                continue;
            }
            if offset > hole_offset {
                self.set_u16(pos, offset - by);
            }
        }
    }
}

#[cfg(test)]
mod slotted_page_tests {
    use super::*;

    const PAGE_SIZE: usize = 256;

    /// heap bytes + directory + free space + trailer must tile the page.
    fn assert_space_conserved(page: &SlottedPage) {
        let marker = page.tombstone_marker();
        let mut live_bytes = 0usize;
        for s in 1..=page.num_slots() {
            let slot = page.read_slot(s).unwrap();
            if slot.length != 0 && slot.length < marker {
                live_bytes += slot.length as usize;
            }
        }
        assert_eq!(
            live_bytes
                + SLOT_SIZE * page.num_slots() as usize
                + page.free_space() as usize
                + TRAILER_SIZE,
            PAGE_SIZE
        );
    }

    #[test]
    fn new_page_is_empty() {
        let page = SlottedPage::new(PAGE_SIZE);
        assert_eq!(page.num_slots(), 0);
        assert_eq!(page.free_space() as usize, PAGE_SIZE - TRAILER_SIZE);
        assert!(page.read_slot(1).is_none());
        assert_space_conserved(&page);
    }

    #[test]
    fn insert_and_read_back() {
        let mut page = SlottedPage::new(PAGE_SIZE);
        let a = page.insert(b"alpha").unwrap();
        let b = page.insert(b"beta").unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(page.record_bytes(1).unwrap(), b"alpha");
        assert_eq!(page.record_bytes(2).unwrap(), b"beta");
        let slot = page.read_slot(2).unwrap();
        assert_eq!(slot.offset, 5);
        assert_eq!(slot.length, 4);
        assert_space_conserved(&page);
    }

    #[test]
    fn delete_compacts_heap_and_fixes_offsets() {
        let mut page = SlottedPage::new(PAGE_SIZE);
        page.insert(b"first").unwrap();
        page.insert(b"second").unwrap();
        page.insert(b"third").unwrap();
        let free_before = page.free_space();

        page.delete(2).unwrap();

        assert_eq!(page.read_slot(2).unwrap(), Slot { offset: 0, length: 0 });
        assert_eq!(page.record_bytes(1).unwrap(), b"first");
        assert_eq!(page.record_bytes(3).unwrap(), b"third");
        assert_eq!(page.read_slot(3).unwrap().offset, 5);
        assert_eq!(page.free_space(), free_before + 6);
        assert_eq!(page.num_slots(), 3);
        assert_space_conserved(&page);
    }

    #[test]
    fn delete_empty_slot_fails() {
        let mut page = SlottedPage::new(PAGE_SIZE);
        page.insert(b"only").unwrap();
        page.delete(1).unwrap();
        assert_eq!(page.delete(1), Err(PageError::EmptySlot(1)));
        assert_eq!(page.delete(9), Err(PageError::SlotOutOfRange(9)));
    }

    #[test]
    fn insert_reuses_first_empty_slot() {
        let mut page = SlottedPage::new(PAGE_SIZE);
        page.insert(b"one").unwrap();
        page.insert(b"two").unwrap();
        page.insert(b"three").unwrap();
        page.delete(2).unwrap();

        let reused = page.insert(b"replacement").unwrap();
        assert_eq!(reused, 2);
        assert_eq!(page.num_slots(), 3);
        assert_eq!(page.record_bytes(2).unwrap(), b"replacement");
        assert_space_conserved(&page);
    }

    #[test]
    fn replace_in_place_shrinks_and_compacts() {
        let mut page = SlottedPage::new(PAGE_SIZE);
        page.insert(b"abcdefgh").unwrap();
        page.insert(b"tail").unwrap();
        let free_before = page.free_space();

        page.replace_in_place(1, b"xyz").unwrap();

        assert_eq!(page.record_bytes(1).unwrap(), b"xyz");
        assert_eq!(page.record_bytes(2).unwrap(), b"tail");
        assert_eq!(page.read_slot(2).unwrap().offset, 3);
        assert_eq!(page.free_space(), free_before + 5);
        assert_space_conserved(&page);

        assert_eq!(
            page.replace_in_place(1, b"this is far too long"),
            Err(PageError::RecordTooLarge)
        );
    }

    #[test]
    fn insert_fails_when_page_is_full() {
        let mut page = SlottedPage::new(64);
        page.insert(&[1u8; 40]).unwrap();
        assert_eq!(page.insert(&[2u8; 40]), Err(PageError::InsufficientSpace));
        // record + slot entry must both fit
        let free = page.free_space() as usize;
        assert_eq!(
            page.insert(&vec![3u8; free - SLOT_SIZE + 1]),
            Err(PageError::InsufficientSpace)
        );
        page.insert(&vec![3u8; free - SLOT_SIZE]).unwrap();
        assert_eq!(page.free_space(), 0);
    }

    #[test]
    fn tombstone_round_trip() {
        let mut page = SlottedPage::new(PAGE_SIZE);
        page.insert(b"victim").unwrap();
        page.delete(1).unwrap();
        page.write_tombstone(1, 7, 3).unwrap();

        let marker = page.tombstone_marker();
        let slot = page.read_slot(1).unwrap();
        assert!(slot.length >= marker);
        assert_eq!(slot.offset - marker, 7);
        assert_eq!(slot.length - marker, 3);
        assert!(page.record_bytes(1).is_none());

        // a forwarding slot is cleared, never heap-deleted
        page.clear_slot(1).unwrap();
        assert_eq!(page.read_slot(1).unwrap(), Slot { offset: 0, length: 0 });
        assert_space_conserved(&page);
    }

    #[test]
    fn compaction_skips_tombstone_offsets() {
        let mut page = SlottedPage::new(PAGE_SIZE);
        page.insert(b"aaaa").unwrap();
        page.insert(b"bbbb").unwrap();
        page.insert(b"cccc").unwrap();
        // slot 2 becomes a tombstone pointing at logical page 200
        page.delete(2).unwrap();
        page.write_tombstone(2, 200, 1).unwrap();
        let forward = page.read_slot(2).unwrap();

        page.delete(1).unwrap();

        // the forwarding entry's fake "offset" must not be rewritten
        assert_eq!(page.read_slot(2).unwrap(), forward);
        assert_eq!(page.record_bytes(3).unwrap(), b"cccc");
        assert_eq!(page.read_slot(3).unwrap().offset, 0);
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut page = SlottedPage::new(PAGE_SIZE);
        page.insert(b"persisted").unwrap();
        let bytes = page.into_bytes();
        let reloaded = SlottedPage::from_bytes(bytes);
        assert_eq!(reloaded.num_slots(), 1);
        assert_eq!(reloaded.record_bytes(1).unwrap(), b"persisted");
    }
}
