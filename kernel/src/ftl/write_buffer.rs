//! Write buffer.
//!
//! Shared across every partition of a namespace, guarded by
//! `spin::Mutex` so `allocate`/`release` stay atomic under concurrent
//! partitions.

use spin::Mutex;

use crate::ftl::geometry::TimingParams;
use crate::ftl::timing::PcieModel;

pub struct WriteBuffer {
    remaining: Mutex<u32>,
    capacity: u32,
}

impl WriteBuffer {
    pub fn new(capacity: u32) -> Self {
        WriteBuffer { remaining: Mutex::new(capacity), capacity }
    }

    /// Returns `n` on success, `0` if fewer than `n` bytes remain.
    pub fn allocate(&self, n: u32) -> u32 {
        let mut remaining = self.remaining.lock();
        if *remaining >= n {
            *remaining -= n;
            n
        } else {
            0
        }
    }

    pub fn release(&self, n: u32) {
        let mut remaining = self.remaining.lock();
        *remaining = (*remaining + n).min(self.capacity);
    }

    pub fn refill(&self) {
        *self.remaining.lock() = self.capacity;
    }

    pub fn remaining(&self) -> u32 {
        *self.remaining.lock()
    }
}

/// `start + fw_wbuf_lat0 + fw_wbuf_lat1 * ceil(length / 4KiB)`, then piped
/// through the PCIe bandwidth model.
pub fn advance_write_buffer(start: u64, length: u32, timing: &TimingParams, pcie: &mut PcieModel) -> u64 {
    let chunks = (length as u64 + 4095) / 4096;
    let fw_done = start + timing.fw_wbuf_latency0 + timing.fw_wbuf_latency1 * chunks;
    pcie.transfer(fw_done, length)
}
