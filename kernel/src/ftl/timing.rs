//! NAND timing simulator.
//!
//! Per-LUN `next_avail_time` models serial command execution within a
//! LUN — not a lock, a counter, but it has the same serializing effect.
//! Channels are private to one partition's timing model; the PCIe
//! bandwidth model is the one piece of this module that is shared
//! across partitions (behind `spin::Mutex`, see `ftl::namespace`).

use alloc::vec::Vec;

use crate::ftl::addr::{cell_type, Ppa};
use crate::ftl::geometry::{Geometry, TimingParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NandOp {
    Read,
    Write,
    Erase,
    Nop,
}

#[derive(Debug, Clone, Copy)]
pub struct NandCommand {
    pub op: NandOp,
    pub ppa: Ppa,
    pub start_time: u64,
    pub xfer_size: u32,
    pub interleave_pci_dma: bool,
}

/// A generic MB/s transfer-time model shared by NAND channels and the
/// PCIe link: `transfer(request_time, length)` returns the time at which
/// `length` bytes starting no earlier than `request_time` would clear
/// the link, and remembers that completion as its own next-available
/// time (serializing back-to-back transfers on the same link).
#[derive(Debug, Clone, Copy)]
pub struct BandwidthModel {
    next_avail: u64,
    bandwidth_mbps: u64,
}

impl BandwidthModel {
    pub fn new(bandwidth_mbps: u64) -> Self {
        BandwidthModel { next_avail: 0, bandwidth_mbps }
    }

    pub fn transfer(&mut self, request_time: u64, length: u32) -> u64 {
        let start = request_time.max(self.next_avail);
        let end = start + bytes_to_ns(length, self.bandwidth_mbps);
        self.next_avail = end;
        end
    }

    pub fn next_avail_time(&self) -> u64 {
        self.next_avail
    }
}

fn bytes_to_ns(bytes: u32, bandwidth_mbps: u64) -> u64 {
    bytes as u64 * 1000 / bandwidth_mbps
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Lun {
    pub next_avail_time: u64,
    /// Set by GC after an erase completes; exposed for statistics.
    pub gc_endtime: u64,
}

/// Shared PCIe bandwidth model, one instance per namespace.
pub type PcieModel = BandwidthModel;

/// Per-partition NAND timing state: one [`Lun`] per (channel, lun) pair,
/// one [`BandwidthModel`] per channel.
pub struct NandTimingModel {
    luns: Vec<Lun>,
    channels: Vec<BandwidthModel>,
    luns_per_ch: u32,
    timing: TimingParams,
}

impl NandTimingModel {
    pub fn new(geo: &Geometry, timing: TimingParams) -> Self {
        let tt_luns = geo.tt_luns as usize;
        NandTimingModel {
            luns: alloc::vec![Lun::default(); tt_luns],
            channels: alloc::vec![BandwidthModel::new(timing.channel_bandwidth_mbps); geo.nchs as usize],
            luns_per_ch: geo.luns_per_ch,
            timing,
        }
    }

    fn lun_index(&self, ppa: Ppa) -> usize {
        (ppa.ch() * self.luns_per_ch + ppa.lun()) as usize
    }

    pub fn lun(&self, ppa: Ppa) -> &Lun {
        &self.luns[self.lun_index(ppa)]
    }

    /// Maximum `next_avail_time` across every LUN; used by flush.
    pub fn next_idle_time(&self) -> u64 {
        self.luns.iter().map(|l| l.next_avail_time).max().unwrap_or(0)
    }

    pub fn advance_nand(&mut self, cmd: &NandCommand, geo: &Geometry, pcie: &mut PcieModel) -> u64 {
        match cmd.op {
            NandOp::Read => self.advance_read(cmd, geo, pcie),
            NandOp::Write => self.advance_write(cmd, geo),
            NandOp::Erase => self.advance_erase(cmd),
            NandOp::Nop => self.advance_nop(cmd),
        }
    }

    fn advance_read(&mut self, cmd: &NandCommand, geo: &Geometry, pcie: &mut PcieModel) -> u64 {
        let ct = cell_type(cmd.ppa, geo) as usize;
        let lat = if cmd.xfer_size == 4096 {
            self.timing.four_kb_read_latency[ct]
        } else {
            self.timing.page_read_latency[ct]
        };
        let lun_idx = self.lun_index(cmd.ppa);
        let nand_start = cmd.start_time.max(self.luns[lun_idx].next_avail_time);
        let nand_end = nand_start + lat;

        let channel = &mut self.channels[cmd.ppa.ch() as usize];
        let mut remaining = cmd.xfer_size;
        let mut chnl_time = nand_end;
        while remaining > 0 {
            let chunk = remaining.min(self.timing.max_ch_xfer_size);
            chnl_time = channel.transfer(chnl_time, chunk);
            remaining -= chunk;
        }

        self.luns[lun_idx].next_avail_time = chnl_time;
        if cmd.interleave_pci_dma {
            pcie.transfer(chnl_time, cmd.xfer_size)
        } else {
            chnl_time
        }
    }

    fn advance_write(&mut self, cmd: &NandCommand, _geo: &Geometry) -> u64 {
        let lun_idx = self.lun_index(cmd.ppa);
        let channel = &mut self.channels[cmd.ppa.ch() as usize];
        let chnl_end = channel.transfer(cmd.start_time.max(self.luns[lun_idx].next_avail_time), cmd.xfer_size);
        let nand_end = chnl_end + self.timing.prog_latency;
        self.luns[lun_idx].next_avail_time = nand_end;
        nand_end
    }

    fn advance_erase(&mut self, cmd: &NandCommand) -> u64 {
        let lun_idx = self.lun_index(cmd.ppa);
        let start = cmd.start_time.max(self.luns[lun_idx].next_avail_time);
        let end = start + self.timing.erase_latency;
        self.luns[lun_idx].next_avail_time = end;
        self.luns[lun_idx].gc_endtime = end;
        end
    }

    fn advance_nop(&mut self, cmd: &NandCommand) -> u64 {
        let lun_idx = self.lun_index(cmd.ppa);
        let end = self.luns[lun_idx].next_avail_time.max(cmd.start_time);
        self.luns[lun_idx].next_avail_time = end;
        end
    }
}
