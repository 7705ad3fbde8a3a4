use std::collections::{BinaryHeap, HashMap};

/// Heap entry ordered by free bytes first, so the top of the heap is always
/// the globally most-free page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PageSpace {
    free_space: u16,
    page_num: u32,
}

/// Per-open-file index of page free space, used to pick insertion targets in
/// O(log n). Entries are never decremented in place: every page mutation
/// pushes a fresh entry and the `latest` table invalidates stale ones lazily
/// as they surface at the top of the heap.
#[derive(Default)]
pub struct FreeSpaceMap {
    heap: BinaryHeap<PageSpace>,
    latest: HashMap<u32, u16>,
}

impl FreeSpaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current free space of a page, superseding any prior entry.
    pub fn note(&mut self, page_num: u32, free_space: u16) {
        self.latest.insert(page_num, free_space);
        self.heap.push(PageSpace {
            free_space,
            page_num,
        });
    }

    /// The page with the most recorded free space, if it has at least
    /// `required` bytes. Stale heap entries are discarded along the way.
    pub fn best_candidate(&mut self, required: usize) -> Option<u32> {
        while let Some(top) = self.heap.peek().copied() {
            match self.latest.get(&top.page_num) {
                Some(&current) if current == top.free_space => {
                    if top.free_space as usize >= required {
                        return Some(top.page_num);
                    }
                    // most-free page is too small, so every page is
                    return None;
                }
                _ => {
                    self.heap.pop();
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod free_space_tests {
    use super::*;

    #[test]
    fn empty_map_has_no_candidate() {
        let mut map = FreeSpaceMap::new();
        assert_eq!(map.best_candidate(1), None);
    }

    #[test]
    fn picks_the_most_free_page() {
        let mut map = FreeSpaceMap::new();
        map.note(0, 100);
        map.note(1, 300);
        map.note(2, 200);
        assert_eq!(map.best_candidate(50), Some(1));
        assert_eq!(map.best_candidate(250), Some(1));
        assert_eq!(map.best_candidate(301), None);
    }

    #[test]
    fn stale_entries_are_invalidated() {
        let mut map = FreeSpaceMap::new();
        map.note(0, 500);
        map.note(0, 10);
        assert_eq!(map.best_candidate(100), None);
        map.note(0, 120);
        assert_eq!(map.best_candidate(100), Some(0));
    }

    #[test]
    fn shrinking_one_page_reveals_the_next_best() {
        let mut map = FreeSpaceMap::new();
        map.note(0, 80);
        map.note(1, 90);
        map.note(1, 5);
        assert_eq!(map.best_candidate(70), Some(0));
    }
}
