//! Device geometry & timing parameters.
//!
//! The static device-geometry configuration table an external caller
//! would otherwise own becomes [`DeviceClass`], a small fixed enum whose
//! `geometry()`/`timing()` hand back the derived [`Geometry`]/
//! [`TimingParams`] the FTL actually consults. `Geometry::custom` is
//! exposed directly for tests that need small, fast-to-exhaust
//! geometries.

use crate::ftl::addr::{CellMode, CellType};

/// Logical page size in bytes. Distinct from the NAND's physical flash
/// page size (`flash_page_size`); an LPN addresses one `PGSZ`-sized unit.
pub const PGSZ: u32 = 4096;

#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub nchs: u32,
    pub luns_per_ch: u32,
    pub pls_per_lun: u32,
    pub blks_per_pl: u32,
    pub pgsz: u32,
    pub pgs_per_flashpg: u32,
    pub flashpgs_per_blk: u32,
    pub pgs_per_oneshotpg: u32,
    pub oneshotpgs_per_blk: u32,
    pub pgs_per_blk: u32,
    pub tt_pgs: u64,
    pub tt_blks: u64,
    pub tt_luns: u32,
    pub blks_per_line: u32,
    pub pgs_per_line: u64,
    pub tt_lines: u32,
    pub cell_mode: CellMode,
}

impl Geometry {
    /// Builds a geometry directly from per-block page counts, bypassing
    /// the byte-capacity derivation in [`Geometry::from_capacity`].
    /// Single-plane only (`pls_per_lun` must be 1, matching the write
    /// pointer's "line id ≡ block id" simplification).
    pub fn custom(
        nchs: u32,
        luns_per_ch: u32,
        pls_per_lun: u32,
        blks_per_pl: u32,
        pgs_per_flashpg: u32,
        pgs_per_blk: u32,
        cell_mode: CellMode,
    ) -> Geometry {
        assert_eq!(pls_per_lun, 1, "multi-plane geometries are not supported");
        assert_eq!(pgs_per_blk % pgs_per_flashpg, 0);
        let flashpgs_per_blk = pgs_per_blk / pgs_per_flashpg;
        let bpc = cell_mode.bits_per_cell();
        assert_eq!(flashpgs_per_blk % bpc, 0);
        let pgs_per_oneshotpg = pgs_per_flashpg * bpc;
        let oneshotpgs_per_blk = flashpgs_per_blk / bpc;

        let tt_luns = nchs * luns_per_ch;
        let tt_blks = tt_luns as u64 * pls_per_lun as u64 * blks_per_pl as u64;
        let tt_pgs = tt_blks * pgs_per_blk as u64;
        let blks_per_line = tt_luns;
        let pgs_per_line = blks_per_line as u64 * pgs_per_blk as u64;
        let tt_lines = blks_per_pl;

        Geometry {
            nchs,
            luns_per_ch,
            pls_per_lun,
            blks_per_pl,
            pgsz: PGSZ,
            pgs_per_flashpg,
            flashpgs_per_blk,
            pgs_per_oneshotpg,
            oneshotpgs_per_blk,
            pgs_per_blk,
            tt_pgs,
            tt_blks,
            tt_luns,
            blks_per_line,
            pgs_per_line,
            tt_lines,
            cell_mode,
        }
    }

    /// Derives `pgs_per_blk` from a byte capacity and the otherwise-fixed
    /// channel/LUN/plane/block counts.
    pub fn from_capacity(
        capacity_bytes: u64,
        nchs: u32,
        luns_per_ch: u32,
        blks_per_pl: u32,
        flash_page_size: u32,
        cell_mode: CellMode,
    ) -> Geometry {
        let tt_luns = nchs * luns_per_ch;
        let tt_blks = tt_luns as u64 * blks_per_pl as u64;
        let pgs_per_blk = (capacity_bytes / tt_blks / PGSZ as u64) as u32;
        let pgs_per_flashpg = flash_page_size / PGSZ;
        Geometry::custom(nchs, luns_per_ch, 1, blks_per_pl, pgs_per_flashpg, pgs_per_blk, cell_mode)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimingParams {
    pub page_read_latency: [u64; CellType::COUNT],
    pub four_kb_read_latency: [u64; CellType::COUNT],
    pub prog_latency: u64,
    pub erase_latency: u64,
    pub fw_4kb_read_latency: u64,
    pub fw_read_latency: u64,
    pub fw_wbuf_latency0: u64,
    pub fw_wbuf_latency1: u64,
    pub max_ch_xfer_size: u32,
    pub channel_bandwidth_mbps: u64,
    pub pcie_bandwidth_mbps: u64,
    pub write_early_completion: bool,
}

impl TimingParams {
    /// SAMSUNG_970PRO-class TLC timings for a datacenter SSD.
    pub fn datacenter() -> TimingParams {
        TimingParams {
            page_read_latency: [30_013, 42_013, 36_013],
            four_kb_read_latency: [29_760, 41_760, 35_760],
            prog_latency: 185_000,
            erase_latency: 0,
            fw_4kb_read_latency: 21_500,
            fw_read_latency: 30_490,
            fw_wbuf_latency0: 4_000,
            fw_wbuf_latency1: 460,
            max_ch_xfer_size: 16 * 1024,
            channel_bandwidth_mbps: 800,
            pcie_bandwidth_mbps: 3_360,
            write_early_completion: true,
        }
    }

    /// Scaled-down timings for tests that want deterministic, small
    /// numbers rather than real device latencies.
    pub fn small() -> TimingParams {
        TimingParams {
            page_read_latency: [300, 420, 360],
            four_kb_read_latency: [297, 417, 357],
            prog_latency: 1_850,
            erase_latency: 0,
            fw_4kb_read_latency: 215,
            fw_read_latency: 305,
            fw_wbuf_latency0: 40,
            fw_wbuf_latency1: 5,
            max_ch_xfer_size: 4096,
            channel_bandwidth_mbps: 800,
            pcie_bandwidth_mbps: 3_360,
            write_early_completion: true,
        }
    }
}

/// Named geometry/timing presets standing in for the out-of-scope
/// external device-geometry configuration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Small geometry, fast to exhaust in tests.
    Small,
    /// SAMSUNG_970PRO-class TLC datacenter SSD.
    Datacenter,
}

impl DeviceClass {
    pub fn geometry(self) -> Geometry {
        match self {
            DeviceClass::Small => Geometry::custom(2, 1, 1, 64, 2, 24, CellMode::Mlc),
            DeviceClass::Datacenter => Geometry::custom(4, 2, 1, 2048, 4, 384, CellMode::Tlc),
        }
    }

    pub fn timing(self) -> TimingParams {
        match self {
            DeviceClass::Small => TimingParams::small(),
            DeviceClass::Datacenter => TimingParams::datacenter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datacenter_geometry_matches_scenario_1() {
        let geo = DeviceClass::Datacenter.geometry();
        assert_eq!(geo.tt_luns, 8);
        assert_eq!(geo.pgs_per_blk, 384);
        assert_eq!(geo.blks_per_line, 8);
        assert_eq!(geo.pgs_per_line, 3072);
        assert_eq!(geo.tt_lines, 2048);
        assert_eq!(geo.tt_blks, 16384);
        assert_eq!(geo.pgs_per_oneshotpg, 12);
        assert_eq!(geo.oneshotpgs_per_blk, 32);
    }

    #[test]
    fn from_capacity_derives_pgs_per_blk() {
        let geo = Geometry::from_capacity(
            16384u64 * 384 * PGSZ as u64,
            4,
            2,
            2048,
            16 * 1024,
            CellMode::Tlc,
        );
        assert_eq!(geo.pgs_per_blk, 384);
    }
}
