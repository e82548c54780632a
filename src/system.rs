//! `VmSystem`: the explicit context object that owns the region, the task
//! registry and the MMU's active-page-table pointer.
//!
//! Keeping these three behind one owned struct instead of process-wide
//! globals avoids global statics or `unsafe impl Sync`, so tests can build
//! several independent systems in the same test binary.

use log::{info, warn};

use crate::error::{MmuError, PagerError, RamError, TaskError};
use crate::mmu;
use crate::page_table::PageTable;
use crate::pager;
use crate::ram::{Region, RegionDescriptor};
use crate::task::{self, TaskRecord, TaskRegistry};

/// The simulated virtual-memory subsystem: a frame allocator, a task
/// registry allocated out of it, and the MMU's active page table.
#[derive(Default)]
pub struct VmSystem {
    region: Option<Region>,
    registry: Option<TaskRegistry>,
    /// Frames the task registry reserved for itself, released on
    /// `destroy_registry`.
    registry_frames: Option<(usize, usize)>,
    active_pid: Option<usize>,
}

impl VmSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes a region over `memory` and an empty task registry on
    /// top of it in one step. If registry initialization fails (normally
    /// unreachable right after a successful region init, but possible for
    /// a region too small to also host the registry's own frames), the
    /// region is torn back down so no half-initialized state leaks out.
    pub fn bootstrap(memory: Vec<u8>, region_size: usize, frame_size: usize) -> Result<Self, RamError> {
        let mut sys = Self::default();
        sys.init_region(memory, region_size, frame_size)?;
        if sys.init_registry().is_err() {
            sys.destroy_region();
            return Err(RamError::RegionTooSmall);
        }
        Ok(sys)
    }

    // -- ram -----------------------------------------------------------

    /// Initializes the region over `memory`. Returns the frame count on
    /// success.
    pub fn init_region(
        &mut self,
        memory: Vec<u8>,
        size: usize,
        frame_size: usize,
    ) -> Result<usize, RamError> {
        let region = Region::init(memory, size, frame_size)?;
        let frame_count = region.frame_count();
        info!(
            "vm: region initialized ({} frames of {} bytes)",
            frame_count, frame_size
        );
        self.region = Some(region);
        Ok(frame_count)
    }

    /// Tears the region down along with everything built on top of it.
    pub fn destroy_region(&mut self) {
        if self.registry.is_some() {
            warn!("vm: destroying region while the task registry is still live");
        }
        self.region = None;
        self.registry = None;
        self.registry_frames = None;
        self.active_pid = None;
    }

    pub fn reserve(&mut self, n: usize) -> Result<usize, RamError> {
        self.region
            .as_mut()
            .ok_or(RamError::NotInitialized)?
            .reserve(n)
    }

    pub fn release(&mut self, frame_id: usize, n: usize) {
        if let Some(region) = self.region.as_mut() {
            region.release(frame_id, n);
        }
    }

    pub fn region_state(&self) -> Option<RegionDescriptor> {
        self.region.as_ref().map(Region::state)
    }

    // -- task registry ---------------------------------------------------

    /// Reserves frames for the registry out of the region, then installs
    /// an empty registry.
    pub fn init_registry(&mut self) -> Result<(), TaskError> {
        let region = self
            .region
            .as_mut()
            .ok_or(TaskError::RegionNotInitialized)?;
        let needed = task::frames_needed(region.frame_size());
        let start = region.reserve(needed).map_err(|_| TaskError::NotInitialized)?;
        self.registry_frames = Some((start, needed));
        self.registry = Some(TaskRegistry::new());
        info!("vm: task registry initialized ({} frames)", needed);
        Ok(())
    }

    /// Releases the registry's own frames and forgets it. No-op if the
    /// region is not initialized.
    pub fn destroy_registry(&mut self) {
        let Some(region) = self.region.as_mut() else {
            return;
        };
        if let Some((start, n)) = self.registry_frames.take() {
            region.release(start, n);
        }
        self.registry = None;
        self.active_pid = None;
    }

    pub fn create_task(
        &mut self,
        page_table_template: PageTable,
        max_frames: usize,
        address_space: Vec<u8>,
    ) -> Result<usize, TaskError> {
        self.registry
            .as_mut()
            .ok_or(TaskError::NotInitialized)?
            .create_task(page_table_template, max_frames, address_space)
    }

    pub fn destroy_task(&mut self, pid: usize) -> Result<(), TaskError> {
        let region = self
            .region
            .as_mut()
            .ok_or(TaskError::RegionNotInitialized)?;
        let registry = self.registry.as_mut().ok_or(TaskError::NotInitialized)?;
        registry.destroy_task(pid, region)?;
        if self.active_pid == Some(pid) {
            self.active_pid = None;
        }
        Ok(())
    }

    pub fn find_task(&self, pid: usize) -> Option<&TaskRecord> {
        self.registry.as_ref()?.get(pid)
    }

    // -- mmu -------------------------------------------------------------

    /// Points the MMU at the page table of `pid` (or detaches it with
    /// `None`). Unconditional: does not check that `pid` is live.
    pub fn set_active_task(&mut self, pid: Option<usize>) {
        self.active_pid = pid;
    }

    pub fn active_task(&self) -> Option<usize> {
        self.active_pid
    }

    fn active(&self) -> Result<(&Region, &TaskRecord), MmuError> {
        // Error ladder order per the external contract: no active page
        // table (-4) is checked before region-not-initialized (-5).
        let pid = self.active_pid.ok_or(MmuError::NoActivePageTable)?;
        let region = self.region.as_ref().ok_or(MmuError::RegionNotInitialized)?;
        let record = self
            .registry
            .as_ref()
            .and_then(|r| r.get(pid))
            .ok_or(MmuError::NoActivePageTable)?;
        Ok((region, record))
    }

    fn active_mut(&mut self) -> Result<(&mut Region, &mut TaskRecord), MmuError> {
        let pid = self.active_pid.ok_or(MmuError::NoActivePageTable)?;
        if self.region.is_none() {
            return Err(MmuError::RegionNotInitialized);
        }
        let record = self
            .registry
            .as_mut()
            .and_then(|r| r.get_mut(pid))
            .ok_or(MmuError::NoActivePageTable)?;
        let region = self.region.as_mut().unwrap();
        Ok((region, record))
    }

    pub fn translate(&self, vaddr: u16) -> Result<u16, MmuError> {
        let (region, record) = self.active()?;
        mmu::translate(&record.page_table, vaddr, region.frame_size())
    }

    pub fn fetch(&mut self, vaddr: u16) -> Result<u8, MmuError> {
        let (region, record) = self.active_mut()?;
        let frame_size = region.frame_size();
        mmu::fetch(&mut record.page_table, vaddr, frame_size, |paddr| {
            region.read_byte(paddr as usize)
        })
    }

    pub fn load(&mut self, vaddr: u16) -> Result<u8, MmuError> {
        let (region, record) = self.active_mut()?;
        let frame_size = region.frame_size();
        mmu::load(&mut record.page_table, vaddr, frame_size, |paddr| {
            region.read_byte(paddr as usize)
        })
    }

    pub fn store(&mut self, vaddr: u16, byte: u8) -> Result<(), MmuError> {
        let (region, record) = self.active_mut()?;
        let frame_size = region.frame_size();
        mmu::store(
            &mut record.page_table,
            vaddr,
            byte,
            frame_size,
            |paddr, b| region.write_byte(paddr as usize, b),
        )
    }

    // -- pager -------------------------------------------------------------

    pub fn page_fault(&mut self, pid: usize, vaddr: u16) -> Result<(), PagerError> {
        let region = self.region.as_mut().ok_or(PagerError::NotFound)?;
        let registry = self.registry.as_mut().ok_or(PagerError::NotFound)?;
        pager::page_fault(registry, region, pid, vaddr)
    }
}
