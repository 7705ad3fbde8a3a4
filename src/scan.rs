use std::cmp::Ordering;

use crate::page::SlottedPage;
use crate::record::{self, Attribute, Value};
use crate::record_manager::{classify, load_page, RecordFile, SlotKind, MAX_FORWARD_HOPS};
use crate::{Rid, StorageError};

/// Comparison operator applied by a scan predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
}

impl CompOp {
    fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompOp::Eq => ordering == Ordering::Equal,
            CompOp::Lt => ordering == Ordering::Less,
            CompOp::Le => ordering != Ordering::Greater,
            CompOp::Gt => ordering == Ordering::Greater,
            CompOp::Ge => ordering != Ordering::Less,
            CompOp::Ne => ordering != Ordering::Equal,
        }
    }
}

/// `attribute <op> value` filter evaluated against each scanned record. A
/// null attribute never matches; scans without a predicate pass `None`
/// instead.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub attribute: String,
    pub op: CompOp,
    pub value: Value,
}

impl Predicate {
    pub fn new(attribute: &str, op: CompOp, value: Value) -> Self {
        Self {
            attribute: attribute.to_string(),
            op,
            value,
        }
    }

    fn matches(&self, candidate: &Value) -> bool {
        candidate
            .compare(&self.value)
            .map(|ordering| self.op.matches(ordering))
            .unwrap_or(false)
    }
}

/// Single-pass cursor over every slot of a record file, in page-then-slot
/// order. Empty slots are skipped; forwarding slots are resolved to the
/// record they point at but reported under their own RID, so callers keep
/// seeing the stable identifier. With an empty projection the scan only
/// enumerates RIDs and yields no payload bytes.
pub struct RecordScan<'a> {
    file: &'a mut RecordFile,
    fields: Vec<Attribute>,
    predicate: Option<Predicate>,
    projection: Vec<String>,
    page_num: u32,
    slot_num: u16,
    current_page: Option<SlottedPage>,
    exhausted: bool,
}

impl<'a> RecordScan<'a> {
    pub(crate) fn new(
        file: &'a mut RecordFile,
        fields: Vec<Attribute>,
        predicate: Option<Predicate>,
        projection: Vec<String>,
    ) -> Self {
        Self {
            file,
            fields,
            predicate,
            projection,
            page_num: 0,
            slot_num: 0,
            current_page: None,
            exhausted: false,
        }
    }

    /// Advance to the next matching record. `Ok(None)` signals end of scan
    /// and keeps being returned afterwards; it is disjoint from every error.
    pub fn next_record(&mut self) -> Result<Option<(Rid, Vec<u8>)>, StorageError> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            let Some(page) = self.current_page.as_ref() else {
                if self.page_num >= self.file.handle.num_pages() {
                    self.exhausted = true;
                    return Ok(None);
                }
                self.current_page = Some(load_page(&mut self.file.handle, self.page_num)?);
                self.slot_num = 0;
                continue;
            };
            if self.slot_num >= page.num_slots() {
                self.current_page = None;
                self.page_num += 1;
                continue;
            }
            self.slot_num += 1;
            let rid = Rid::new(self.page_num, self.slot_num);
            let Some(slot) = page.read_slot(self.slot_num) else {
                continue;
            };
            let record = match classify(slot, page.tombstone_marker()) {
                SlotKind::Empty => continue,
                SlotKind::Live => match page.record_bytes(self.slot_num) {
                    Some(bytes) => bytes.to_vec(),
                    None => return Err(StorageError::MalformedRecord),
                },
                SlotKind::Forward(target) => {
                    match resolve_forward(self.file, target)? {
                        Some(bytes) => bytes,
                        // dangling forward: nothing to return for this slot
                        None => continue,
                    }
                }
            };

            if let Some(predicate) = &self.predicate {
                let (is_null, bytes) =
                    record::read_field(&self.fields, &predicate.attribute, &record)?;
                if is_null {
                    continue;
                }
                let attr_type = self
                    .fields
                    .iter()
                    .find(|f| f.name == predicate.attribute)
                    .map(|f| f.attr_type)
                    .ok_or_else(|| {
                        StorageError::AttributeNotFound(predicate.attribute.clone())
                    })?;
                let value = Value::from_wire(attr_type, &bytes)?;
                if !predicate.matches(&value) {
                    continue;
                }
            }

            let data = if self.projection.is_empty() {
                Vec::new()
            } else {
                record::project(&self.fields, &self.projection, &record)?
            };
            return Ok(Some((rid, data)));
        }
    }
}

impl Iterator for RecordScan<'_> {
    type Item = Result<(Rid, Vec<u8>), StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Chase a forwarding chain encountered mid-scan. The scan's own page cursor
/// is untouched; target pages are read independently.
fn resolve_forward(file: &mut RecordFile, rid: Rid) -> Result<Option<Vec<u8>>, StorageError> {
    let mut cur = rid;
    for _ in 0..MAX_FORWARD_HOPS {
        let page = load_page(&mut file.handle, cur.page_num)?;
        let Some(slot) = page.read_slot(cur.slot_num) else {
            return Ok(None);
        };
        match classify(slot, page.tombstone_marker()) {
            SlotKind::Empty => return Ok(None),
            SlotKind::Live => {
                return Ok(page.record_bytes(cur.slot_num).map(|bytes| bytes.to_vec()))
            }
            SlotKind::Forward(next) => cur = next,
        }
    }
    Err(StorageError::TombstoneLoop(MAX_FORWARD_HOPS))
}
