//! GC engine.
//!
//! `do_gc` is internally best-effort: a selection failure is silently
//! tolerated unless `force` is set, in which case an empty victim heap is
//! a fatal condition of the simulator.

use crate::ftl::addr::Ppa;
use crate::ftl::config::CoreConfig;
use crate::ftl::error::FtlError;
use crate::ftl::flow_control::FlowControl;
use crate::ftl::geometry::Geometry;
use crate::ftl::line::{LineManager, PageStatus};
use crate::ftl::mapping::MappingTable;
use crate::ftl::stats::Stats;
use crate::ftl::timing::{NandCommand, NandOp, NandTimingModel, PcieModel};
use crate::ftl::write_pointer::{is_last_page_of_wordline, IoType, WritePointer};

fn gc_write_page(
    old_ppa: Ppa,
    nsecs_start: u64,
    geo: &Geometry,
    line_mgr: &mut LineManager,
    mapping: &mut MappingTable,
    gc_wp: &mut WritePointer,
    nand: &mut NandTimingModel,
    pcie: &mut PcieModel,
) -> Result<(), FtlError> {
    let lpn = mapping.rmap_get(old_ppa.linearize(geo));
    assert!(lpn.is_valid(), "gc_write_page on a valid page with no reverse mapping");

    let new_ppa = gc_wp.get_new_page();
    mapping.set(lpn, new_ppa);
    mapping.rmap_set(new_ppa.linearize(geo), lpn);
    line_mgr.mark_page_valid(new_ppa);
    gc_wp.advance(line_mgr, geo, IoType::Gc)?;

    let cmd = if is_last_page_of_wordline(new_ppa.pg(), geo) {
        NandCommand {
            op: NandOp::Write,
            ppa: new_ppa,
            start_time: nsecs_start,
            xfer_size: geo.pgsz * geo.pgs_per_oneshotpg,
            interleave_pci_dma: false,
        }
    } else {
        NandCommand { op: NandOp::Nop, ppa: new_ppa, start_time: nsecs_start, xfer_size: 0, interleave_pci_dma: false }
    };
    nand.advance_nand(&cmd, geo, pcie);
    Ok(())
}

fn clean_one_flashpg(
    group_start: Ppa,
    nsecs_start: u64,
    geo: &Geometry,
    config: &CoreConfig,
    line_mgr: &mut LineManager,
    mapping: &mut MappingTable,
    gc_wp: &mut WritePointer,
    nand: &mut NandTimingModel,
    pcie: &mut PcieModel,
) -> Result<(), FtlError> {
    let mut valid_count = 0u32;
    for i in 0..geo.pgs_per_flashpg {
        let p = group_start.with_pg(group_start.pg() + i);
        if line_mgr.page_status(p) == PageStatus::Valid {
            valid_count += 1;
        }
    }
    if valid_count == 0 {
        return Ok(());
    }

    if config.gc_delay {
        let cmd = NandCommand {
            op: NandOp::Read,
            ppa: group_start,
            start_time: nsecs_start,
            xfer_size: geo.pgsz * valid_count,
            interleave_pci_dma: false,
        };
        nand.advance_nand(&cmd, geo, pcie);
    }

    for i in 0..geo.pgs_per_flashpg {
        let p = group_start.with_pg(group_start.pg() + i);
        if line_mgr.page_status(p) == PageStatus::Valid {
            gc_write_page(p, nsecs_start, geo, line_mgr, mapping, gc_wp, nand, pcie)?;
        }
    }
    Ok(())
}

/// Select a victim, relocate every valid page, erase every constituent
/// block, and return the line to the free pool.
#[allow(clippy::too_many_arguments)]
pub fn do_gc(
    force: bool,
    nsecs_start: u64,
    geo: &Geometry,
    config: &CoreConfig,
    line_mgr: &mut LineManager,
    mapping: &mut MappingTable,
    gc_wp: &mut WritePointer,
    nand: &mut NandTimingModel,
    pcie: &mut PcieModel,
    flow: &mut FlowControl,
    stats: &mut Stats,
) -> Result<(), FtlError> {
    let victim = match line_mgr.select_victim(force, nsecs_start) {
        Some(v) => v,
        None if force => return Err(FtlError::GcNoVictim),
        None => return Ok(()),
    };

    if config.debug_mode {
        let age_ns = nsecs_start.saturating_sub(line_mgr.line(victim).last_modified_time);
        stats.record_victim(age_ns);
    }

    flow.set_credits_to_refill(line_mgr.line(victim).ipc as u64);

    for ch in 0..geo.nchs {
        for lun in 0..geo.luns_per_ch {
            for group in 0..geo.flashpgs_per_blk {
                let ppa = Ppa::new(ch, lun, 0, victim, group * geo.pgs_per_flashpg);
                clean_one_flashpg(ppa, nsecs_start, geo, config, line_mgr, mapping, gc_wp, nand, pcie)?;
            }
            let erase_ppa = Ppa::new(ch, lun, 0, victim, 0);
            line_mgr.mark_block_free(erase_ppa);
            let cmd = NandCommand { op: NandOp::Erase, ppa: erase_ppa, start_time: nsecs_start, xfer_size: 0, interleave_pci_dma: false };
            nand.advance_nand(&cmd, geo, pcie);
        }
    }

    line_mgr.mark_line_free(victim);
    Ok(())
}
