//! Page-fault handler (`pager`): services a fault by finding a free frame
//! or selecting a victim within the faulting task's resident set via NRU,
//! writing back modified pages, and updating page-table state.

use log::{debug, trace};

use crate::error::PagerError;
use crate::page_table::PAGE_TABLE_SIZE;
use crate::ram::Region;
use crate::task::TaskRegistry;

/// Services a page fault for `pid` at `vaddr`, making the covering page
/// resident in its current page table.
///
/// Single pass over the task's page table: validates preconditions, scans
/// the resident set (writing back every dirty page and resetting
/// `r_bit`/`m_bit` along the way, regardless of whether the fault itself
/// ultimately succeeds), then either allocates a fresh frame or evicts the
/// best NRU victim, and installs the faulting page.
pub fn page_fault(
    registry: &mut TaskRegistry,
    region: &mut Region,
    pid: usize,
    vaddr: u16,
) -> Result<(), PagerError> {
    let frame_size = region.frame_size();
    let page_id = vaddr as usize / frame_size;

    let record = registry.get_mut(pid).ok_or(PagerError::NotFound)?;

    if page_id >= PAGE_TABLE_SIZE {
        return Err(PagerError::SegmentationFault);
    }
    let faulting = record.page_table[page_id];
    if !faulting.is_accessible() {
        return Err(PagerError::SegmentationFault);
    }
    if faulting.p_bit {
        return Err(PagerError::AlreadyResident);
    }

    let page_table = &mut record.page_table;
    let address_space = &mut record.address_space;
    let max_frames = record.max_frames;

    let mut cnt = 0usize;
    let mut victim: Option<usize> = None;
    let mut victim_class = 0u8;

    for i in 0..PAGE_TABLE_SIZE {
        let entry = page_table[i];
        if !entry.p_bit {
            continue;
        }
        cnt += 1;

        if entry.m_bit {
            let dst = &mut address_space[i * frame_size..(i + 1) * frame_size];
            region.copy_from_frame(entry.frame_id as usize, dst);
            trace!(
                "pager: pid={} wrote back dirty page {} from frame {}",
                pid,
                i,
                entry.frame_id
            );
        }

        let class = entry.nru_class();
        if victim.is_none() || class > victim_class {
            victim = Some(i);
            victim_class = class;
        }

        page_table[i].r_bit = false;
        page_table[i].m_bit = false;
    }

    let under_cap = max_frames == 0 || cnt < max_frames;
    let frame_id = if under_cap {
        region.reserve(1).ok()
    } else {
        None
    };

    let frame_id = match frame_id {
        Some(f) => f,
        None => {
            let v = victim.ok_or(PagerError::OutOfResources)?;
            let vframe = page_table[v].frame_id as usize;
            page_table[v].p_bit = false;
            page_table[v].frame_id = 0;
            trace!("pager: pid={} evicted page {} (frame {})", pid, v, vframe);
            vframe
        }
    };

    page_table[page_id].p_bit = true;
    page_table[page_id].frame_id = frame_id as u16;

    let src_start = page_id * frame_size;
    region.copy_into_frame(frame_id, &address_space[src_start..src_start + frame_size]);

    debug!(
        "pager: pid={} faulted in page {} -> frame {}",
        pid, page_id, frame_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::{empty_page_table, PageTableEntry};

    const FRAME_SIZE: usize = 128;
    const REGION_SIZE: usize = 2048;

    fn seeded_region() -> Region {
        Region::init(vec![0u8; REGION_SIZE], REGION_SIZE, FRAME_SIZE).unwrap()
    }

    fn seeded_address_space() -> Vec<u8> {
        let mut space = vec![0u8; FRAME_SIZE * PAGE_TABLE_SIZE];
        for page in 0..PAGE_TABLE_SIZE {
            for b in space[page * FRAME_SIZE..(page + 1) * FRAME_SIZE].iter_mut() {
                *b = (page + 5) as u8;
            }
        }
        space
    }

    fn rwx_table() -> crate::page_table::PageTable {
        let mut pt = empty_page_table();
        for e in pt.iter_mut() {
            *e = PageTableEntry::valid_absent(true, true, true);
        }
        pt
    }

    #[test]
    fn first_fault_resolves_and_matches_address_space() {
        let mut region = seeded_region();
        let mut registry = TaskRegistry::new();
        let pid = registry
            .create_task(rwx_table(), 3, seeded_address_space())
            .unwrap();

        page_fault(&mut registry, &mut region, pid, 1 * FRAME_SIZE as u16).unwrap();

        let record = registry.get(pid).unwrap();
        assert!(record.page_table[1].p_bit);
        let frame_id = record.page_table[1].frame_id as usize;
        assert_eq!(
            region.frame_bytes(frame_id),
            &record.address_space[FRAME_SIZE..2 * FRAME_SIZE]
        );
    }

    #[test]
    fn fault_on_resident_page_is_rejected() {
        let mut region = seeded_region();
        let mut registry = TaskRegistry::new();
        let pid = registry
            .create_task(rwx_table(), 3, seeded_address_space())
            .unwrap();
        page_fault(&mut registry, &mut region, pid, FRAME_SIZE as u16).unwrap();
        assert_eq!(
            page_fault(&mut registry, &mut region, pid, FRAME_SIZE as u16),
            Err(PagerError::AlreadyResident)
        );
    }

    #[test]
    fn cap_enforced_evicts_on_fourth_fault() {
        let mut region = seeded_region();
        let mut registry = TaskRegistry::new();
        let pid = registry
            .create_task(rwx_table(), 3, seeded_address_space())
            .unwrap();

        for page in [1usize, 2, 7] {
            page_fault(&mut registry, &mut region, pid, (page * FRAME_SIZE) as u16).unwrap();
        }
        assert_eq!(registry.resident_count(pid), Some(3));

        page_fault(&mut registry, &mut region, pid, (3 * FRAME_SIZE) as u16).unwrap();
        assert_eq!(registry.resident_count(pid), Some(3));

        let record = registry.get(pid).unwrap();
        let resident: Vec<usize> = (0..PAGE_TABLE_SIZE)
            .filter(|&i| record.page_table[i].p_bit)
            .collect();
        assert!(resident.contains(&3));
        let evicted_count = [1, 2, 7].iter().filter(|&&p| !resident.contains(&p)).count();
        assert_eq!(evicted_count, 1);
    }

    #[test]
    fn referenced_page_survives_over_unreferenced_peer() {
        let mut region = seeded_region();
        let mut registry = TaskRegistry::new();
        let pid = registry
            .create_task(rwx_table(), 2, seeded_address_space())
            .unwrap();

        for page in [1usize, 2] {
            page_fault(&mut registry, &mut region, pid, (page * FRAME_SIZE) as u16).unwrap();
        }
        {
            let record = registry.get_mut(pid).unwrap();
            record.page_table[1].r_bit = true;
        }
        page_fault(&mut registry, &mut region, pid, (7 * FRAME_SIZE) as u16).unwrap();

        let record = registry.get(pid).unwrap();
        assert!(record.page_table[1].p_bit);
        assert!(!record.page_table[1].r_bit);
        assert!(!record.page_table[2].p_bit);
        assert!(record.page_table[7].p_bit);
    }

    #[test]
    fn dirty_pages_write_back_before_eviction() {
        let mut region = seeded_region();
        let mut registry = TaskRegistry::new();
        let pid = registry
            .create_task(rwx_table(), 2, seeded_address_space())
            .unwrap();

        for page in [1usize, 2] {
            page_fault(&mut registry, &mut region, pid, (page * FRAME_SIZE) as u16).unwrap();
        }

        let (frame1, frame2) = {
            let record = registry.get(pid).unwrap();
            (
                record.page_table[1].frame_id as usize,
                record.page_table[2].frame_id as usize,
            )
        };
        region.frame_bytes_mut(frame1)[0] = 0xAA;
        region.frame_bytes_mut(frame2)[0] = 0xBB;
        {
            let record = registry.get_mut(pid).unwrap();
            record.page_table[1].m_bit = true;
            record.page_table[2].m_bit = true;
        }

        page_fault(&mut registry, &mut region, pid, (7 * FRAME_SIZE) as u16).unwrap();

        let record = registry.get(pid).unwrap();
        assert!(!record.page_table[1].m_bit);
        assert!(!record.page_table[2].m_bit);
        assert_eq!(record.address_space[1 * FRAME_SIZE], 0xAA);
        assert_eq!(record.address_space[2 * FRAME_SIZE], 0xBB);
    }

    #[test]
    fn segfault_on_inaccessible_page() {
        let mut region = seeded_region();
        let mut registry = TaskRegistry::new();
        let pt = empty_page_table();
        let pid = registry
            .create_task(pt, 0, seeded_address_space())
            .unwrap();
        assert_eq!(
            page_fault(&mut registry, &mut region, pid, 0),
            Err(PagerError::SegmentationFault)
        );
    }

    #[test]
    fn out_of_resources_when_region_exhausted_and_nothing_to_evict() {
        // A region with only enough frames for its own metadata leaves no
        // free frame, and a task with zero resident pages has no victim.
        let mut region = Region::init(vec![0u8; 256], 256, 128).unwrap();
        let mut registry = TaskRegistry::new();
        let pid = registry
            .create_task(rwx_table(), 0, seeded_address_space())
            .unwrap();
        // Drain the one remaining free frame so reserve() fails.
        let _ = region.reserve(region.state().frame_count - region.state().reserved_frames);
        assert_eq!(
            page_fault(&mut registry, &mut region, pid, 0),
            Err(PagerError::OutOfResources)
        );
    }
}
