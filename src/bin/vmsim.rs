//! Thin demonstration harness for the virtual-memory subsystem.
//!
//! Builds one `VmSystem`, spawns a single task, and walks it through a
//! fault, a store, an eviction and a teardown while logging every step
//! through `log`. Argument parsing and the debug-print toggle are
//! intentionally minimal: the core subsystem they drive is what this
//! crate actually specifies.

use std::env;

use vmsim::page_table::{empty_page_table, PageTableEntry, PAGE_TABLE_SIZE};
use vmsim::VmSystem;

const REGION_SIZE: usize = 2048;
const FRAME_SIZE: usize = 128;

fn main() {
    let verbose = env::args().any(|a| a == "-v" || a == "--verbose");
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let mut system = VmSystem::new();
    system
        .init_region(vec![0u8; REGION_SIZE], REGION_SIZE, FRAME_SIZE)
        .expect("region init with a valid power-of-two size must succeed");
    system
        .init_registry()
        .expect("registry init right after region init must succeed");

    let mut page_table = empty_page_table();
    for entry in page_table.iter_mut() {
        *entry = PageTableEntry::valid_absent(true, true, false);
    }

    let mut address_space = vec![0u8; FRAME_SIZE * PAGE_TABLE_SIZE];
    for page in 0..PAGE_TABLE_SIZE {
        for b in address_space[page * FRAME_SIZE..(page + 1) * FRAME_SIZE].iter_mut() {
            *b = (page + 5) as u8;
        }
    }

    let pid = system
        .create_task(page_table, 3, address_space)
        .expect("a fresh registry has a free slot");
    system.set_active_task(Some(pid));
    log::info!("spawned task pid={pid}");

    for page in [1usize, 2, 7] {
        let vaddr = (page * FRAME_SIZE) as u16;
        system.page_fault(pid, vaddr).expect("page is not yet resident");
        let byte = system.load(vaddr).expect("page is now resident and readable");
        log::info!("faulted in page {page}, read byte 0x{byte:02x}");
    }

    system
        .store((1 * FRAME_SIZE) as u16, 0xAB)
        .expect("page 1 is writable");
    log::info!("stored 0xAB into page 1 (now dirty)");

    // max_frames=3 and 3 pages already resident: this fault must evict one.
    let vaddr = (3 * FRAME_SIZE) as u16;
    system
        .page_fault(pid, vaddr)
        .expect("the cap forces an eviction, not a failure");
    log::info!("faulted in page 3, forcing an NRU eviction");

    system.destroy_task(pid).expect("pid is live");
    log::info!("destroyed task pid={pid}");
}
