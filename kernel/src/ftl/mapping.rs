//! Mapping tables.
//!
//! Dense arrays sized to the partition's `tt_pgs`. Mutation only happens
//! through the `mark_page_*`/write-pointer sequences in `ftl::io` and
//! `ftl::gc` that keep NAND page status in lockstep — that forward/
//! reverse-map consistency invariant is the test harness's
//! discrimination function, not something this module enforces on its
//! own.

use alloc::vec;
use alloc::vec::Vec;

use crate::ftl::addr::{Lpn, Ppa};
use crate::ftl::geometry::Geometry;

pub struct MappingTable {
    maptbl: Vec<Ppa>,
    rmap: Vec<Lpn>,
}

impl MappingTable {
    pub fn new(geo: &Geometry) -> Self {
        let size = geo.tt_pgs as usize;
        MappingTable { maptbl: vec![Ppa::INVALID; size], rmap: vec![Lpn::INVALID; size] }
    }

    pub fn get(&self, lpn: Lpn) -> Ppa {
        self.maptbl[lpn.get() as usize]
    }

    pub fn set(&mut self, lpn: Lpn, ppa: Ppa) {
        self.maptbl[lpn.get() as usize] = ppa;
    }

    pub fn clear(&mut self, lpn: Lpn) {
        self.maptbl[lpn.get() as usize] = Ppa::INVALID;
    }

    pub fn rmap_get(&self, page_index: u64) -> Lpn {
        self.rmap[page_index as usize]
    }

    pub fn rmap_set(&mut self, page_index: u64, lpn: Lpn) {
        self.rmap[page_index as usize] = lpn;
    }

    pub fn rmap_clear(&mut self, page_index: u64) {
        self.rmap[page_index as usize] = Lpn::INVALID;
    }
}
