//! Paged memory manager: an inverted page table mapping physical frames to
//! the (process, logical range) that owns them.
//!
//! Grounded on `microkernel.c`'s `MMU`/`MMUEntry`/`init_MMU`/`request_new_page`/
//! `get_physical_from_logical_addr`. Frame lookup is a linear scan rather than
//! an index by `(pid, logical >> 12)`; the process/page counts here are small
//! enough that the scan is not a bottleneck, and it keeps allocate/translate/
//! release symmetric with the original.

use log::{debug, trace};

use crate::config::{NUM_PAGES, PAGE_SIZE};

pub type ProcessId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Free,
    Code,
    Data,
    Text,
    Heap,
    Stack,
}

/// A single inverted-page-table entry: one per physical frame.
#[derive(Debug, Clone, Copy)]
pub struct PageTableEntry {
    pub process_id: ProcessId,
    pub kind: PageKind,
    pub allocated: bool,
    pub logical_start: u32,
    pub physical_start: u32,
}

impl PageTableEntry {
    fn free_at(frame_index: u32) -> Self {
        Self {
            process_id: 0,
            kind: PageKind::Free,
            allocated: false,
            logical_start: 0,
            physical_start: frame_index * PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("out of physical pages")]
pub struct OutOfPages;

/// A stable reference to an allocated frame, returned by `allocate`.
#[derive(Debug, Clone, Copy)]
pub struct PageRef {
    pub logical_start: u32,
    pub physical_start: u32,
}

pub struct Mmu {
    table: Vec<PageTableEntry>,
}

impl Mmu {
    pub fn new() -> Self {
        let table = (0..NUM_PAGES).map(PageTableEntry::free_at).collect();
        Self { table }
    }

    /// Linearly scan for the first free frame, hand it to `process_id`,
    /// advancing `max_logical_addr` by one page. Fails with `OutOfPages` if
    /// none remain.
    pub fn allocate(
        &mut self,
        process_id: ProcessId,
        kind: PageKind,
        max_logical_addr: &mut u32,
    ) -> Result<PageRef, OutOfPages> {
        let logical_start = *max_logical_addr;
        for entry in self.table.iter_mut() {
            if !entry.allocated {
                entry.allocated = true;
                entry.process_id = process_id;
                entry.kind = kind;
                entry.logical_start = logical_start;
                *max_logical_addr += PAGE_SIZE;
                trace!(
                    "mmu: allocated frame phys=0x{:08X} to pid={} logical=0x{:08X} kind={:?}",
                    entry.physical_start, process_id, logical_start, kind
                );
                return Ok(PageRef {
                    logical_start: entry.logical_start,
                    physical_start: entry.physical_start,
                });
            }
        }
        Err(OutOfPages)
    }

    /// Translate a (pid, logical) pair to a physical address. `None` if no
    /// PTE maps it.
    pub fn translate(&self, process_id: ProcessId, logical: u32) -> Option<u32> {
        self.table.iter().find_map(|entry| {
            if !entry.allocated || entry.process_id != process_id {
                return None;
            }
            if logical >= entry.logical_start && logical < entry.logical_start + PAGE_SIZE {
                Some(entry.physical_start + (logical & (PAGE_SIZE - 1)))
            } else {
                None
            }
        })
    }

    /// Free every frame owned by `process_id`, returning it to `Free`.
    pub fn release(&mut self, process_id: ProcessId) {
        let mut freed = 0;
        for entry in self.table.iter_mut() {
            if entry.allocated && entry.process_id == process_id {
                *entry = PageTableEntry::free_at(entry.physical_start / PAGE_SIZE);
                freed += 1;
            }
        }
        debug!("mmu: released {freed} frame(s) for pid={process_id}");
    }

    /// Find the PTE for the lowest-logical-address stack page and the
    /// highest-logical-address heap page owned by `process_id`, used by the
    /// `brk` syscall to move the heap/stack boundary. Returns
    /// `(lowest_stack_index, highest_heap_index)`.
    pub fn heap_stack_boundary(&self, process_id: ProcessId) -> (Option<usize>, Option<usize>) {
        let mut lowest_stack: Option<usize> = None;
        let mut highest_heap: Option<usize> = None;
        for (i, entry) in self.table.iter().enumerate() {
            if entry.process_id != process_id || !entry.allocated {
                continue;
            }
            match entry.kind {
                PageKind::Stack => {
                    if lowest_stack
                        .map(|j| entry.logical_start < self.table[j].logical_start)
                        .unwrap_or(true)
                    {
                        lowest_stack = Some(i);
                    }
                }
                PageKind::Heap => {
                    if highest_heap
                        .map(|j| entry.logical_start > self.table[j].logical_start)
                        .unwrap_or(true)
                    {
                        highest_heap = Some(i);
                    }
                }
                _ => {}
            }
        }
        (lowest_stack, highest_heap)
    }

    pub fn set_kind(&mut self, index: usize, kind: PageKind) {
        self.table[index].kind = kind;
    }

    pub fn entry(&self, index: usize) -> &PageTableEntry {
        &self.table[index]
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_recovers_in_page_offset_for_every_allocated_page() {
        let mut mmu = Mmu::new();
        let mut max_addr = 0u32;
        let page = mmu.allocate(1, PageKind::Data, &mut max_addr).unwrap();
        for k in 0..PAGE_SIZE {
            let logical = page.logical_start + k;
            assert_eq!(mmu.translate(1, logical), Some(page.physical_start + k));
        }
    }

    #[test]
    fn translate_fails_for_unmapped_process() {
        let mut mmu = Mmu::new();
        let mut max_addr = 0u32;
        mmu.allocate(1, PageKind::Code, &mut max_addr).unwrap();
        assert_eq!(mmu.translate(2, 0), None);
    }

    #[test]
    fn release_returns_all_frames_to_free() {
        let mut mmu = Mmu::new();
        let mut max_addr = 0u32;
        for _ in 0..4 {
            mmu.allocate(5, PageKind::Heap, &mut max_addr).unwrap();
        }
        mmu.release(5);
        for entry in &mmu.table {
            if entry.process_id == 5 {
                assert!(!entry.allocated);
            }
        }
        assert_eq!(mmu.translate(5, 0), None);
    }

    #[test]
    fn allocate_fails_once_pages_are_exhausted() {
        let mut mmu = Mmu::new();
        let mut max_addr = 0u32;
        let mut count = 0;
        loop {
            match mmu.allocate(9, PageKind::Data, &mut max_addr) {
                Ok(_) => count += 1,
                Err(OutOfPages) => break,
            }
        }
        assert_eq!(count as u32, NUM_PAGES);
    }
}
