//! Task registry (`task`): a fixed-capacity directory of active tasks,
//! each carrying a page table, a resident-frame cap, and a handle to its
//! private backing buffer.

use log::{debug, trace};

use crate::error::TaskError;
use crate::page_table::PageTable;
use crate::ram::Region;

/// Maximum number of simultaneously live tasks.
pub const MAX_TASKS: usize = 8;

/// Conceptual per-slot footprint of a task record (pid, max_frames,
/// address-space pointer, and an 8-entry page table at 3 bytes/entry),
/// used only to size the frames the registry reserves for itself. Kept
/// independent of this crate's actual in-memory `TaskRecord` layout, which
/// the registry's frame accounting has no need to track byte-for-byte.
const REGISTRY_SLOT_SIZE_BYTES: usize = 32;

/// A live task: its resident-frame cap, its private backing buffer, and
/// its page table.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub max_frames: usize,
    pub address_space: Vec<u8>,
    pub page_table: PageTable,
}

/// Fixed-capacity directory of live tasks, indexed by pid.
pub struct TaskRegistry {
    slots: [Option<TaskRecord>; MAX_TASKS],
}

/// Number of frames the registry itself needs, given the region's frame
/// size.
pub fn frames_needed(frame_size: usize) -> usize {
    let bytes = REGISTRY_SLOT_SIZE_BYTES * MAX_TASKS;
    (bytes + frame_size - 1) / frame_size
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    /// Assigns the first free slot to a new task, copying `page_table` by
    /// value. No frames are reserved by this call.
    pub fn create_task(
        &mut self,
        page_table: PageTable,
        max_frames: usize,
        address_space: Vec<u8>,
    ) -> Result<usize, TaskError> {
        if address_space.is_empty() {
            return Err(TaskError::InvalidArgument);
        }

        let pid = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(TaskError::NoFreeSlot)?;

        self.slots[pid] = Some(TaskRecord {
            max_frames,
            address_space,
            page_table,
        });
        debug!("task: created pid={} max_frames={}", pid, max_frames);
        Ok(pid)
    }

    /// Releases every resident frame owned by `pid` through `region`, then
    /// frees its slot.
    pub fn destroy_task(&mut self, pid: usize, region: &mut Region) -> Result<(), TaskError> {
        let slot = self.slots.get_mut(pid).ok_or(TaskError::NotFound)?;
        let record = slot.take().ok_or(TaskError::NotFound)?;

        for entry in record.page_table.iter() {
            if entry.p_bit {
                region.release(entry.frame_id as usize, 1);
                trace!(
                    "task: destroy pid={} released frame {}",
                    pid,
                    entry.frame_id
                );
            }
        }
        debug!("task: destroyed pid={}", pid);
        Ok(())
    }

    pub fn get(&self, pid: usize) -> Option<&TaskRecord> {
        self.slots.get(pid)?.as_ref()
    }

    pub fn get_mut(&mut self, pid: usize) -> Option<&mut TaskRecord> {
        self.slots.get_mut(pid)?.as_mut()
    }

    /// Number of resident frames currently held by `pid`, if it is live.
    pub fn resident_count(&self, pid: usize) -> Option<usize> {
        Some(
            self.get(pid)?
                .page_table
                .iter()
                .filter(|e| e.p_bit)
                .count(),
        )
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
