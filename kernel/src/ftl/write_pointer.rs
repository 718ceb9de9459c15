//! Write pointers.
//!
//! Two independent cursors — USER and GC — each stripe page → channel →
//! LUN → wordline → block across whatever line they currently have
//! open. They must never share an open line.

use crate::ftl::error::FtlError;
use crate::ftl::geometry::Geometry;
use crate::ftl::line::LineManager;
use crate::ftl::addr::Ppa;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoType {
    User,
    Gc,
}

#[derive(Debug, Clone, Copy)]
pub struct WritePointer {
    pub current_line: u32,
    pub ch: u32,
    pub lun: u32,
    pub pl: u32,
    pub blk: u32,
    pub pg: u32,
}

impl WritePointer {
    pub fn new(line_mgr: &mut LineManager, io_type: IoType) -> Result<Self, FtlError> {
        let id = line_mgr.take_free_line(io_type == IoType::Gc).ok_or(FtlError::OutOfSpace)?;
        Ok(WritePointer { current_line: id, ch: 0, lun: 0, pl: 0, blk: id, pg: 0 })
    }

    /// The next page to be written. Does not mutate the cursor — callers
    /// update the mapping tables and line state first, then call
    /// [`WritePointer::advance`].
    pub fn get_new_page(&self) -> Ppa {
        Ppa::new(self.ch, self.lun, self.pl, self.blk, self.pg)
    }

    /// Progress the cursor by one page. Afterward the cursor references
    /// a FREE page, and `blk` always equals `current_line` (single-plane
    /// simplification).
    pub fn advance(&mut self, line_mgr: &mut LineManager, geo: &Geometry, io_type: IoType) -> Result<(), FtlError> {
        self.pg += 1;
        if self.pg % geo.pgs_per_oneshotpg != 0 {
            return Ok(());
        }
        self.pg -= geo.pgs_per_oneshotpg;
        self.ch += 1;
        if self.ch != geo.nchs {
            return Ok(());
        }
        self.ch = 0;
        self.lun += 1;
        if self.lun != geo.luns_per_ch {
            return Ok(());
        }
        self.lun = 0;
        self.pg += geo.pgs_per_oneshotpg;
        if self.pg != geo.pgs_per_blk {
            return Ok(());
        }

        line_mgr.finish_open_line(self.current_line);
        let new_line = line_mgr.take_free_line(io_type == IoType::Gc).ok_or(FtlError::OutOfSpace)?;
        self.current_line = new_line;
        self.blk = new_line;
        self.pg = 0;
        self.ch = 0;
        self.lun = 0;
        Ok(())
    }
}

/// True when `pg` is the last page of its oneshot-program group (the
/// point at which GC/write emit a NAND WRITE instead of a NOP).
pub fn is_last_page_of_wordline(pg: u32, geo: &Geometry) -> bool {
    (pg + 1) % geo.pgs_per_oneshotpg == 0
}
