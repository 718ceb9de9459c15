//! Line manager.
//!
//! Owns the line array, the NAND block array, the free-list, the
//! full-list, and the victim heap (`ftl::heap::IndexedHeap`). The heap's
//! `set_priority` hook is where a line's `vpc` actually gets decremented
//! for a line that is already a heap member — `change_priority` is
//! called with `line.vpc - 1` and the hook is what performs the write,
//! so the caller never double-decrements.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use rand_core::RngCore;

use crate::ftl::addr::Ppa;
use crate::ftl::geometry::Geometry;
use crate::ftl::heap::{dummy_cmp, min_heap_cmp, Comparator, HeapAccessor, IndexedHeap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Free,
    Valid,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub pages: Vec<PageStatus>,
    pub vpc: u32,
    pub ipc: u32,
    pub erase_cnt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Free,
    OpenUser,
    OpenGc,
    Full,
    Victim,
}

#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub id: u32,
    pub vpc: u32,
    pub ipc: u32,
    /// 1-based position in the victim heap, 0 if not a member.
    pub pos: usize,
    pub last_modified_time: u64,
    pub state: LineState,
}

/// Victim-selection policy, as a tagged enum rather than a generic
/// parameter on `LineManager`. `Random` carries a boxed [`RngCore`]
/// rather than making the whole manager generic over a concrete RNG
/// type.
pub enum GcPolicy {
    Greedy,
    CostBenefit,
    Random(Box<dyn RngCore>),
}

fn weight(age_ns: u64) -> u64 {
    if age_ns < 100_000_000 {
        1
    } else if age_ns < 5_000_000_000 {
        5
    } else if age_ns < 60_000_000_000 {
        20
    } else {
        100
    }
}

struct LineAccessor<'a> {
    lines: &'a mut [Line],
}

impl<'a> HeapAccessor<u32> for LineAccessor<'a> {
    fn priority(&self, item: u32) -> i64 {
        self.lines[item as usize].vpc as i64
    }
    fn set_priority(&mut self, item: u32, priority: i64) {
        self.lines[item as usize].vpc = priority as u32;
    }
    fn position(&self, item: u32) -> usize {
        self.lines[item as usize].pos
    }
    fn set_position(&mut self, item: u32, position: usize) {
        self.lines[item as usize].pos = position;
    }
}

pub struct LineManager {
    lines: Vec<Line>,
    blocks: Vec<Block>,
    free_list: Vec<u32>,
    full_list: Vec<u32>,
    victim_heap: IndexedHeap<u32>,
    policy: GcPolicy,
    geo: Geometry,
    greedy_threshold_num: u32,
    greedy_threshold_den: u32,
}

impl LineManager {
    pub fn new(geo: Geometry, policy: GcPolicy, greedy_threshold_num: u32, greedy_threshold_den: u32) -> Self {
        let tt_lines = geo.tt_lines;
        let lines: Vec<Line> = (0..tt_lines)
            .map(|id| Line { id, vpc: 0, ipc: 0, pos: 0, last_modified_time: 0, state: LineState::Free })
            .collect();
        let blocks: Vec<Block> = (0..geo.tt_blks)
            .map(|_| Block { pages: vec![PageStatus::Free; geo.pgs_per_blk as usize], vpc: 0, ipc: 0, erase_cnt: 0 })
            .collect();
        let free_list: Vec<u32> = (0..tt_lines).rev().collect();
        LineManager {
            lines,
            blocks,
            free_list,
            full_list: Vec::new(),
            victim_heap: IndexedHeap::with_capacity(tt_lines as usize),
            policy,
            geo,
            greedy_threshold_num,
            greedy_threshold_den,
        }
    }

    fn cmp(&self) -> Comparator<u32> {
        match self.policy {
            GcPolicy::Greedy => min_heap_cmp,
            GcPolicy::CostBenefit | GcPolicy::Random(_) => dummy_cmp,
        }
    }

    fn block_index(&self, ppa: Ppa) -> usize {
        (ppa.ch() * self.geo.luns_per_ch + ppa.lun()) as usize * self.geo.blks_per_pl as usize + ppa.blk() as usize
    }

    pub fn line(&self, id: u32) -> &Line {
        &self.lines[id as usize]
    }

    pub fn block(&self, ppa: Ppa) -> &Block {
        &self.blocks[self.block_index(ppa)]
    }

    pub fn page_status(&self, ppa: Ppa) -> PageStatus {
        self.blocks[self.block_index(ppa)].pages[ppa.pg() as usize]
    }

    pub fn free_line_cnt(&self) -> usize {
        self.free_list.len()
    }

    pub fn full_line_cnt(&self) -> usize {
        self.full_list.len()
    }

    pub fn victim_line_cnt(&self) -> usize {
        self.victim_heap.len()
    }

    /// Pop a line off the free-list, for a write pointer to bind. `None`
    /// if exhausted (the caller turns this into `FtlError::OutOfSpace`).
    pub fn take_free_line(&mut self, for_gc: bool) -> Option<u32> {
        let id = self.free_list.pop()?;
        self.lines[id as usize].state = if for_gc { LineState::OpenGc } else { LineState::OpenUser };
        Some(id)
    }

    /// An open line has just taken its last page: it becomes full, or
    /// (if a page was invalidated mid-sweep) a victim candidate
    /// directly.
    pub fn finish_open_line(&mut self, id: u32) {
        let pgs_per_line = self.geo.pgs_per_line as u32;
        if self.lines[id as usize].vpc == pgs_per_line {
            self.lines[id as usize].state = LineState::Full;
            self.full_list.push(id);
        } else {
            debug_assert!(self.lines[id as usize].ipc > 0, "open line filled with neither full vpc nor any invalidation");
            self.lines[id as usize].state = LineState::Victim;
            let cmp = self.cmp();
            let mut acc = LineAccessor { lines: &mut self.lines };
            self.victim_heap.insert(&mut acc, cmp, id).expect("victim heap presized to total_lines");
        }
    }

    pub fn mark_page_valid(&mut self, ppa: Ppa) {
        let bidx = self.block_index(ppa);
        let pg = ppa.pg() as usize;
        assert_eq!(self.blocks[bidx].pages[pg], PageStatus::Free, "mark_page_valid on non-free page");
        self.blocks[bidx].pages[pg] = PageStatus::Valid;
        self.blocks[bidx].vpc += 1;
        self.lines[ppa.blk() as usize].vpc += 1;
    }

    pub fn mark_page_invalid(&mut self, ppa: Ppa, now_ns: u64) {
        let bidx = self.block_index(ppa);
        let pg = ppa.pg() as usize;
        assert_eq!(self.blocks[bidx].pages[pg], PageStatus::Valid, "mark_page_invalid on non-valid page");
        self.blocks[bidx].pages[pg] = PageStatus::Invalid;
        self.blocks[bidx].ipc += 1;
        self.blocks[bidx].vpc -= 1;

        let line_id = ppa.blk();
        let pgs_per_line = self.geo.pgs_per_line as u32;
        let was_full = self.lines[line_id as usize].vpc == pgs_per_line;
        self.lines[line_id as usize].ipc += 1;

        if self.lines[line_id as usize].pos != 0 {
            let new_vpc = self.lines[line_id as usize].vpc - 1;
            let cmp = self.cmp();
            let mut acc = LineAccessor { lines: &mut self.lines };
            self.victim_heap.change_priority(&mut acc, cmp, line_id, new_vpc as i64);
        } else if was_full {
            self.full_list.retain(|&id| id != line_id);
            self.lines[line_id as usize].vpc -= 1;
            self.lines[line_id as usize].state = LineState::Victim;
            let cmp = self.cmp();
            let mut acc = LineAccessor { lines: &mut self.lines };
            self.victim_heap.insert(&mut acc, cmp, line_id).expect("victim heap presized to total_lines");
        } else {
            self.lines[line_id as usize].vpc -= 1;
        }
        self.lines[line_id as usize].last_modified_time = now_ns;
    }

    pub fn mark_block_free(&mut self, ppa: Ppa) {
        let bidx = self.block_index(ppa);
        let block = &mut self.blocks[bidx];
        for p in block.pages.iter_mut() {
            *p = PageStatus::Free;
        }
        block.vpc = 0;
        block.ipc = 0;
        block.erase_cnt += 1;
    }

    pub fn mark_line_free(&mut self, id: u32) {
        self.lines[id as usize].vpc = 0;
        self.lines[id as usize].ipc = 0;
        self.lines[id as usize].state = LineState::Free;
        self.free_list.push(id);
    }

    /// Select a victim line under the configured policy. `now_ns` is
    /// only consulted by Cost-Benefit.
    pub fn select_victim(&mut self, force: bool, now_ns: u64) -> Option<u32> {
        match &mut self.policy {
            GcPolicy::Greedy => {
                let root = self.victim_heap.peek()?;
                let vpc = self.lines[root as usize].vpc;
                let threshold = (self.geo.pgs_per_line as u32 * self.greedy_threshold_num) / self.greedy_threshold_den;
                if vpc > threshold && !force {
                    return None;
                }
                let mut acc = LineAccessor { lines: &mut self.lines };
                self.victim_heap.pop(&mut acc, min_heap_cmp)
            }
            GcPolicy::Random(rng) => {
                if self.victim_heap.is_empty() {
                    return None;
                }
                let idx = (rng.next_u32() as usize) % self.victim_heap.len();
                let item = self.victim_heap.iter().nth(idx)?;
                let mut acc = LineAccessor { lines: &mut self.lines };
                self.victim_heap.remove(&mut acc, dummy_cmp, item);
                Some(item)
            }
            GcPolicy::CostBenefit => {
                if self.victim_heap.is_empty() {
                    return None;
                }
                let mut best: Option<(u32, f64)> = None;
                for item in self.victim_heap.iter() {
                    let line = &self.lines[item as usize];
                    let age_ns = now_ns.saturating_sub(line.last_modified_time);
                    let score = (weight(age_ns) as f64 * line.ipc as f64) / (line.vpc as f64 + 1.0);
                    if best.map(|(_, s)| score > s).unwrap_or(true) {
                        best = Some((item, score));
                    }
                }
                let item = best.unwrap().0;
                let mut acc = LineAccessor { lines: &mut self.lines };
                self.victim_heap.remove(&mut acc, dummy_cmp, item);
                Some(item)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftl::addr::CellMode;

    fn small_geo() -> Geometry {
        Geometry::custom(2, 1, 1, 4, 1, 4, CellMode::Slc)
    }

    fn fill_line(lm: &mut LineManager, geo: &Geometry, id: u32) {
        for b in 0..geo.blks_per_line {
            let ch = b / geo.luns_per_ch;
            let lun = b % geo.luns_per_ch;
            for pg in 0..geo.pgs_per_blk {
                lm.mark_page_valid(Ppa::new(ch, lun, 0, id, pg));
            }
        }
        lm.finish_open_line(id);
    }

    #[test]
    fn greedy_threshold_force() {
        let geo = small_geo();
        let mut lm = LineManager::new(geo, GcPolicy::Greedy, 1, 8);
        let id = lm.take_free_line(false).unwrap();
        fill_line(&mut lm, &geo, id);
        assert_eq!(lm.line(id).state, LineState::Full);

        // Invalidate one page (of pgs_per_line = 8) to demote the line
        // into the victim heap; vpc=7 is still above the 1/8 threshold.
        lm.mark_page_invalid(Ppa::new(0, 0, 0, id, 0), 1);
        assert_eq!(lm.line(id).state, LineState::Victim);
        assert!(lm.select_victim(false, 1).is_none(), "vpc still above threshold");
        assert_eq!(lm.select_victim(true, 1), Some(id));
    }

    #[test]
    fn cost_benefit_weight_buckets() {
        assert_eq!(weight(0), 1);
        assert_eq!(weight(99_000_000), 1);
        assert_eq!(weight(100_000_000), 5);
        assert_eq!(weight(4_999_000_000), 5);
        assert_eq!(weight(5_000_000_000), 20);
        assert_eq!(weight(59_999_000_000), 20);
        assert_eq!(weight(60_000_000_000), 100);
    }

    #[test]
    fn cost_benefit_selects_highest_score() {
        let geo = small_geo();
        let mut lm = LineManager::new(geo, GcPolicy::CostBenefit, 1, 8);

        let a = lm.take_free_line(false).unwrap();
        fill_line(&mut lm, &geo, a);
        let b = lm.take_free_line(false).unwrap();
        fill_line(&mut lm, &geo, b);

        // Both lines start Full (vpc=8, ipc=0); invalidate a different
        // number of pages in each so their cost-benefit scores diverge.
        for pg in 0..4 {
            lm.mark_page_invalid(Ppa::new(0, 0, 0, a, pg), 1);
        }
        lm.mark_page_invalid(Ppa::new(0, 0, 0, b, 0), 1);

        assert_eq!(lm.line(a).ipc, 4);
        assert_eq!(lm.line(a).vpc, 4);
        assert_eq!(lm.line(b).ipc, 1);
        assert_eq!(lm.line(b).vpc, 7);
        assert_eq!(lm.victim_line_cnt(), 2);

        // Same age for both (weight(0) = 1): score(a) = 4 / (4 + 1) = 0.8,
        // score(b) = 1 / (7 + 1) = 0.125.
        let victim = lm.select_victim(false, 1).unwrap();
        assert_eq!(victim, a, "higher ipc/vpc ratio should score higher under cost-benefit");
        assert_eq!(lm.victim_line_cnt(), 1);
    }

    #[test]
    fn random_policy_picks_from_victim_heap_without_panicking() {
        use rand_chacha::ChaCha8Rng;
        use rand_core::SeedableRng;

        let geo = small_geo();
        let rng: Box<dyn RngCore> = Box::new(ChaCha8Rng::seed_from_u64(42));
        let mut lm = LineManager::new(geo, GcPolicy::Random(rng), 1, 8);

        let a = lm.take_free_line(false).unwrap();
        fill_line(&mut lm, &geo, a);
        let b = lm.take_free_line(false).unwrap();
        fill_line(&mut lm, &geo, b);
        lm.mark_page_invalid(Ppa::new(0, 0, 0, a, 0), 1);
        lm.mark_page_invalid(Ppa::new(0, 0, 0, b, 0), 1);
        assert_eq!(lm.victim_line_cnt(), 2);

        let victim = lm.select_victim(false, 1).unwrap();
        assert!(victim == a || victim == b);
        assert_eq!(lm.victim_line_cnt(), 1);

        let other = lm.select_victim(false, 1).unwrap();
        assert_ne!(other, victim);
        assert_eq!(lm.victim_line_cnt(), 0);
        assert!(lm.select_victim(false, 1).is_none());
    }
}
