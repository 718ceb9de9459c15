//! Namespace: `nr_parts` independent FTL instances sharing one write
//! buffer and one PCIe bandwidth model.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use rand_core::RngCore;
use spin::Mutex;

use crate::ftl::config::{CoreConfig, GcMode};
use crate::ftl::geometry::{Geometry, TimingParams};
use crate::ftl::io::{lba_range_to_lpn_range, policy_from_mode, reserve_write_buffer, Dispatcher, IoCmd, IoCommandHandler, IoRequest, IoResult, NvmeStatus};
use crate::ftl::timing::PcieModel;
use crate::ftl::write_buffer::WriteBuffer;

pub struct Namespace {
    nr_parts: u32,
    geo: Geometry,
    /// Host-visible capacity after over-provisioning is set aside.
    size: u64,
    parts: Vec<IoCommandHandler>,
    write_buffer: Arc<WriteBuffer>,
    pcie: Arc<Mutex<PcieModel>>,
    pub unsupported_opcode_cnt: u64,
}

impl Namespace {
    /// `geo`/`timing` describe a single partition; `capacity_bytes` is
    /// the namespace's total physical capacity across all `nr_parts`
    /// partitions. `make_rng` is only invoked when `config.gc_mode ==
    /// GcMode::Random`, once per partition.
    pub fn new(
        capacity_bytes: u64,
        geo: Geometry,
        timing: TimingParams,
        nr_parts: u32,
        config: CoreConfig,
        write_buffer_capacity: u32,
        mut make_rng: impl FnMut() -> Box<dyn RngCore>,
    ) -> Namespace {
        let write_buffer = Arc::new(WriteBuffer::new(write_buffer_capacity));
        let pcie = Arc::new(Mutex::new(PcieModel::new(timing.pcie_bandwidth_mbps)));

        let parts = (0..nr_parts)
            .map(|part_id| {
                let rng = if config.gc_mode == GcMode::Random { Some(make_rng()) } else { None };
                let policy = policy_from_mode(config.gc_mode, rng);
                IoCommandHandler::new(part_id, nr_parts, geo, timing, config, policy, write_buffer.clone(), pcie.clone())
            })
            .collect();

        // ns.size = capacity_bytes * 100 / pba_pcent, pba_pcent = (1 + op_area_pcent) * 100.
        let pba_pcent = (1.0 + config.op_area_pcent as f64) * 100.0;
        let size = (capacity_bytes as f64 * 100.0 / pba_pcent) as u64;

        Namespace { nr_parts, geo, size, parts, write_buffer, pcie, unsupported_opcode_cnt: 0 }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn write_buffer_remaining(&self) -> u32 {
        self.write_buffer.remaining()
    }

    /// Route one host command across every partition instance and
    /// reduce their completion times to the single value the dispatcher
    /// schedules the completion queue entry at.
    pub fn process_io(&mut self, req: &IoRequest, disp: &mut impl Dispatcher) -> IoResult {
        match req.cmd {
            IoCmd::Read { slba, nlb } => {
                let (start_lpn, end_lpn) = lba_range_to_lpn_range(slba, nlb, self.geo.pgsz);
                let target = self.parts.iter_mut().map(|p| p.read(start_lpn, end_lpn, req.nsecs_start)).max().unwrap_or(req.nsecs_start);
                IoResult { status: NvmeStatus::success(), nsecs_target: target }
            }
            IoCmd::Write { slba, nlb, fua } => {
                let (start_lpn, end_lpn) = lba_range_to_lpn_range(slba, nlb, self.geo.pgsz);
                // Reserved once for the whole LBA range, before any partition
                // is touched, so a shortfall never leaves some partitions'
                // mapping/line state mutated while others were never reached.
                let total_bytes = ((end_lpn - start_lpn + 1) * self.geo.pgsz as u64) as u32;
                if reserve_write_buffer(&self.write_buffer, total_bytes).is_err() {
                    return IoResult { status: NvmeStatus::write_buffer_full(), nsecs_target: req.nsecs_start };
                }

                let mut target = req.nsecs_start;
                for part in self.parts.iter_mut() {
                    match part.write(start_lpn, end_lpn, req.nsecs_start, total_bytes, fua, req.sq_id, disp) {
                        Ok(t) => target = target.max(t),
                        Err(e) => panic!("fatal ftl error during write: {}", e),
                    }
                }
                IoResult { status: NvmeStatus::success(), nsecs_target: target }
            }
            IoCmd::Flush => {
                let target = self.parts.iter().map(|p| p.flush()).max().unwrap_or(req.nsecs_start);
                IoResult { status: NvmeStatus::success(), nsecs_target: target }
            }
            IoCmd::Trim { slba, nlb } => {
                let (start_lpn, end_lpn) = lba_range_to_lpn_range(slba, nlb, self.geo.pgsz);
                for part in self.parts.iter_mut() {
                    part.trim(start_lpn, end_lpn, req.nsecs_start);
                }
                IoResult { status: NvmeStatus::success(), nsecs_target: req.nsecs_start }
            }
            IoCmd::Other(_) => {
                self.unsupported_opcode_cnt += 1;
                IoResult { status: NvmeStatus::invalid_opcode(), nsecs_target: req.nsecs_start }
            }
        }
    }
}
