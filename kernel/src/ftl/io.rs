//! IO command handler.
//!
//! One [`IoCommandHandler`] per partition; [`crate::ftl::namespace::Namespace`]
//! fans a host command out across all of them and reduces their
//! completion times. `NvmeStatus` models the status-code-type/status-code
//! pair NVMe completions carry (generic command status, media status,
//! etc.) rather than inventing a parallel taxonomy.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::ftl::addr::{Lpn, Ppa};
use crate::ftl::config::{CoreConfig, GcMode};
use crate::ftl::error::FtlError;
use crate::ftl::flow_control::FlowControl;
use crate::ftl::gc::do_gc;
use crate::ftl::geometry::{Geometry, TimingParams};
use crate::ftl::line::{GcPolicy, LineManager};
use crate::ftl::mapping::MappingTable;
use crate::ftl::stats::Stats;
use crate::ftl::timing::{NandCommand, NandOp, NandTimingModel, PcieModel};
use crate::ftl::write_buffer::{advance_write_buffer, WriteBuffer};
use crate::ftl::write_pointer::{is_last_page_of_wordline, IoType, WritePointer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvmeStatus {
    /// NVMe Status Code Type.
    pub sct: u8,
    /// NVMe Status Code.
    pub sc: u8,
}

impl NvmeStatus {
    pub fn success() -> Self {
        NvmeStatus { sct: 0x0, sc: 0x00 }
    }

    /// Generic Command Status: Invalid Command Opcode.
    pub fn invalid_opcode() -> Self {
        NvmeStatus { sct: 0x0, sc: 0x01 }
    }

    /// Command Specific Status: Queue full / try again.
    pub fn write_buffer_full() -> Self {
        NvmeStatus { sct: 0x1, sc: 0x05 }
    }

    pub fn is_success(self) -> bool {
        self.sct == 0 && self.sc == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub enum IoCmd {
    Read { slba: u64, nlb: u32 },
    Write { slba: u64, nlb: u32, fua: bool },
    Flush,
    Trim { slba: u64, nlb: u32 },
    /// Any opcode this core doesn't implement. Carries the raw opcode
    /// byte purely for diagnostics.
    Other(u8),
}

#[derive(Debug, Clone, Copy)]
pub struct IoRequest {
    pub sq_id: u16,
    pub nsecs_start: u64,
    pub cmd: IoCmd,
}

#[derive(Debug, Clone, Copy)]
pub struct IoResult {
    pub status: NvmeStatus,
    pub nsecs_target: u64,
}

/// Internal-operation contract (core → dispatcher): invoked when a
/// wordline program completes, telling the dispatcher to release
/// `bytes_to_release` from the write buffer at `completion_time_ns`.
pub trait Dispatcher {
    fn schedule_internal_operation(&mut self, sq_id: u16, completion_time_ns: u64, bytes_to_release: u32);
}

pub(crate) fn lba_range_to_lpn_range(slba: u64, nlb: u32, pgsz: u32) -> (u64, u64) {
    const LBA_SIZE: u64 = 512;
    let start_byte = slba * LBA_SIZE;
    let end_byte = start_byte + nlb as u64 * LBA_SIZE;
    let start_lpn = start_byte / pgsz as u64;
    let end_lpn = (end_byte - 1) / pgsz as u64;
    (start_lpn, end_lpn)
}

fn same_flash_page(a: Ppa, b: Ppa, geo: &Geometry) -> bool {
    a.block_in_ssd() == b.block_in_ssd() && (a.pg() / geo.pgs_per_flashpg) == (b.pg() / geo.pgs_per_flashpg)
}

pub(crate) fn policy_from_mode(mode: GcMode, rng: Option<alloc::boxed::Box<dyn rand_core::RngCore>>) -> GcPolicy {
    match mode {
        GcMode::Greedy => GcPolicy::Greedy,
        GcMode::CostBenefit => GcPolicy::CostBenefit,
        GcMode::Random => GcPolicy::Random(rng.expect("GcMode::Random requires an rng")),
    }
}

/// Reserves `bytes` of write-buffer credit for a whole host command before
/// any partition touches its state, so a shortfall is detected atomically
/// instead of surfacing only after earlier partitions already mutated
/// their mapping/line state.
pub(crate) fn reserve_write_buffer(wb: &WriteBuffer, bytes: u32) -> Result<(), FtlError> {
    if wb.allocate(bytes) == 0 {
        Err(FtlError::BufferFull)
    } else {
        Ok(())
    }
}

/// One of `nr_parts` independent FTL instances. LPN `L` is owned by the
/// instance `L mod nr_parts`; its local LPN is `L / nr_parts`.
pub struct IoCommandHandler {
    part_id: u32,
    nr_parts: u32,
    geo: Geometry,
    timing: TimingParams,
    config: CoreConfig,
    line_mgr: LineManager,
    mapping: MappingTable,
    user_wp: WritePointer,
    gc_wp: WritePointer,
    nand: NandTimingModel,
    flow: FlowControl,
    pub stats: Stats,
    write_buffer: Arc<WriteBuffer>,
    pcie: Arc<Mutex<PcieModel>>,
}

impl IoCommandHandler {
    pub fn new(
        part_id: u32,
        nr_parts: u32,
        geo: Geometry,
        timing: TimingParams,
        config: CoreConfig,
        policy: GcPolicy,
        write_buffer: Arc<WriteBuffer>,
        pcie: Arc<Mutex<PcieModel>>,
    ) -> Self {
        let mut line_mgr = LineManager::new(geo, policy, config.greedy_threshold_num, config.greedy_threshold_den);
        let mapping = MappingTable::new(&geo);
        let user_wp = WritePointer::new(&mut line_mgr, IoType::User).expect("namespace geometry too small to open a user line");
        let gc_wp = WritePointer::new(&mut line_mgr, IoType::Gc).expect("namespace geometry too small to open a gc line");
        let nand = NandTimingModel::new(&geo, timing);
        let flow = FlowControl::new(geo.pgs_per_line);
        IoCommandHandler {
            part_id,
            nr_parts,
            geo,
            timing,
            config,
            line_mgr,
            mapping,
            user_wp,
            gc_wp,
            nand,
            flow,
            stats: Stats::default(),
            write_buffer,
            pcie,
        }
    }

    /// `(global_lpn, local_lpn)` pairs owned by this instance within
    /// `[start_lpn, end_lpn]`.
    fn owned_lpns(&self, start_lpn: u64, end_lpn: u64) -> Vec<(u64, u64)> {
        let nr = self.nr_parts as u64;
        let part = self.part_id as u64;
        let mut out = Vec::new();
        if end_lpn < start_lpn {
            return out;
        }
        let mut g = start_lpn + (nr + part - start_lpn % nr) % nr;
        while g <= end_lpn {
            out.push((g, g / nr));
            g += nr;
        }
        out
    }

    pub fn read(&mut self, start_lpn: u64, end_lpn: u64, nsecs_start: u64) -> u64 {
        let owned = self.owned_lpns(start_lpn, end_lpn);
        let payload_bytes = owned.len() as u32 * self.geo.pgsz;
        let fw_lat = if payload_bytes <= 4096 { self.timing.fw_4kb_read_latency } else { self.timing.fw_read_latency };
        let mut max_completion = nsecs_start + fw_lat;

        let mut pending: Option<(Ppa, u32)> = None;
        for (global_lpn, local_lpn) in owned {
            if self.config.debug_mode {
                self.stats.record_access(global_lpn, self.config.hot_region_lpn_limit);
            }
            let ppa = self.mapping.get(Lpn::new(local_lpn));
            if !ppa.is_valid() {
                if let Some((seg_ppa, count)) = pending.take() {
                    max_completion = max_completion.max(self.issue_aggregated_read(seg_ppa, count, nsecs_start));
                }
                continue;
            }
            match pending {
                Some((seg_ppa, count)) if same_flash_page(seg_ppa, ppa, &self.geo) => {
                    pending = Some((seg_ppa, count + 1));
                }
                _ => {
                    if let Some((seg_ppa, count)) = pending.take() {
                        max_completion = max_completion.max(self.issue_aggregated_read(seg_ppa, count, nsecs_start));
                    }
                    pending = Some((ppa, 1));
                }
            }
        }
        if let Some((seg_ppa, count)) = pending.take() {
            max_completion = max_completion.max(self.issue_aggregated_read(seg_ppa, count, nsecs_start));
        }
        max_completion
    }

    fn issue_aggregated_read(&mut self, ppa: Ppa, count: u32, nsecs_start: u64) -> u64 {
        let cmd = NandCommand {
            op: NandOp::Read,
            ppa,
            start_time: nsecs_start,
            xfer_size: self.geo.pgsz * count,
            interleave_pci_dma: true,
        };
        let mut pcie = self.pcie.lock();
        self.nand.advance_nand(&cmd, &self.geo, &mut pcie)
    }

    /// `reserved_bytes` is this command's full write-buffer allocation,
    /// already granted by [`crate::ftl::namespace::Namespace::process_io`]
    /// before any partition was called; this partition's own share can
    /// never exceed it.
    pub fn write(
        &mut self,
        start_lpn: u64,
        end_lpn: u64,
        nsecs_start: u64,
        reserved_bytes: u32,
        fua: bool,
        sq_id: u16,
        disp: &mut impl Dispatcher,
    ) -> Result<u64, FtlError> {
        let owned = self.owned_lpns(start_lpn, end_lpn);
        let bytes = owned.len() as u32 * self.geo.pgsz;
        debug_assert!(bytes <= reserved_bytes, "partition's write exceeds the buffer space reserved for the whole command");

        let nsecs_xfer_completed = {
            let mut pcie = self.pcie.lock();
            advance_write_buffer(nsecs_start, bytes, &self.timing, &mut pcie)
        };

        let mut max_nand_completion = nsecs_xfer_completed;
        for (global_lpn, local_lpn) in owned {
            if self.config.debug_mode {
                self.stats.record_access(global_lpn, self.config.hot_region_lpn_limit);
            }
            let lpn = Lpn::new(local_lpn);
            let old_ppa = self.mapping.get(lpn);
            if old_ppa.is_valid() {
                self.line_mgr.mark_page_invalid(old_ppa, nsecs_start);
                self.mapping.rmap_clear(old_ppa.linearize(&self.geo));
            }

            let new_ppa = self.user_wp.get_new_page();
            self.mapping.set(lpn, new_ppa);
            self.mapping.rmap_set(new_ppa.linearize(&self.geo), lpn);
            self.line_mgr.mark_page_valid(new_ppa);
            self.user_wp.advance(&mut self.line_mgr, &self.geo, IoType::User)?;

            if is_last_page_of_wordline(new_ppa.pg(), &self.geo) {
                let cmd = NandCommand {
                    op: NandOp::Write,
                    ppa: new_ppa,
                    start_time: nsecs_start,
                    xfer_size: self.geo.pgsz * self.geo.pgs_per_oneshotpg,
                    interleave_pci_dma: false,
                };
                let completion = {
                    let mut pcie = self.pcie.lock();
                    self.nand.advance_nand(&cmd, &self.geo, &mut pcie)
                };
                max_nand_completion = max_nand_completion.max(completion);
                disp.schedule_internal_operation(sq_id, completion, cmd.xfer_size);
            }

            self.flow.consume();
            if self.flow.needs_refill() {
                let mut pcie = self.pcie.lock();
                do_gc(
                    true,
                    nsecs_start,
                    &self.geo,
                    &self.config,
                    &mut self.line_mgr,
                    &mut self.mapping,
                    &mut self.gc_wp,
                    &mut self.nand,
                    &mut pcie,
                    &mut self.flow,
                    &mut self.stats,
                )?;
                self.flow.refill();
            }
        }

        if fua || !self.timing.write_early_completion {
            Ok(max_nand_completion)
        } else {
            Ok(nsecs_xfer_completed)
        }
    }

    /// Invalidate every mapped LPN in range without writing a new page
    /// (DSM/TRIM: no new PPA is allocated, no write pointer advances).
    pub fn trim(&mut self, start_lpn: u64, end_lpn: u64, nsecs_start: u64) {
        for (_, local_lpn) in self.owned_lpns(start_lpn, end_lpn) {
            let lpn = Lpn::new(local_lpn);
            let ppa = self.mapping.get(lpn);
            if ppa.is_valid() {
                self.line_mgr.mark_page_invalid(ppa, nsecs_start);
                self.mapping.clear(lpn);
                self.mapping.rmap_clear(ppa.linearize(&self.geo));
            }
        }
    }

    pub fn flush(&self) -> u64 {
        self.nand.next_idle_time()
    }

    #[cfg(test)]
    pub(crate) fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    #[cfg(test)]
    pub(crate) fn line_mgr(&self) -> &LineManager {
        &self.line_mgr
    }

    #[cfg(test)]
    pub(crate) fn nand(&self) -> &NandTimingModel {
        &self.nand
    }
}
