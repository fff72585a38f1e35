//! Sector allocator
//!
//! Tracks which sectors of a region file are in use. Freed extents are not
//! compacted; they are reused only when a later allocation fits.

use super::HEADER_SECTORS;

/// Free/used map over every sector of a region file
#[derive(Debug, Clone)]
pub struct SectorMap {
    used: Vec<bool>,
}

impl SectorMap {
    /// `sector_count` sectors, all free except the header
    pub fn new(sector_count: u32) -> Self {
        let count = sector_count.max(HEADER_SECTORS) as usize;
        let mut used = vec![false; count];
        for sector in used.iter_mut().take(HEADER_SECTORS as usize) {
            *sector = true;
        }
        Self { used }
    }

    /// Sectors covered, i.e. file length in sectors
    pub fn len(&self) -> u32 {
        self.used.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn used_count(&self) -> u32 {
        self.used.iter().filter(|&&u| u).count() as u32
    }

    /// True if every sector in the range exists and is free
    pub fn is_free(&self, start: u32, count: u32) -> bool {
        let (start, end) = (start as usize, (start + count) as usize);
        end <= self.used.len() && self.used[start..end].iter().all(|&u| !u)
    }

    /// Mark a range used, growing the map if it runs past the end
    pub fn reserve(&mut self, start: u32, count: u32) {
        let end = (start + count) as usize;
        if end > self.used.len() {
            self.used.resize(end, false);
        }
        for sector in &mut self.used[start as usize..end] {
            *sector = true;
        }
    }

    /// Mark a range free; the header is never released
    pub fn release(&mut self, start: u32, count: u32) {
        let end = ((start + count) as usize).min(self.used.len());
        let start = (start as usize).max(HEADER_SECTORS as usize);
        if start >= end {
            return;
        }
        for sector in &mut self.used[start..end] {
            *sector = false;
        }
    }

    /// Smallest free run of at least `count` sectors; lowest start wins ties
    pub fn best_fit(&self, count: u32) -> Option<u32> {
        let count = count as usize;
        let mut best: Option<(usize, usize)> = None;
        let mut run_start = 0;
        let mut run_len = 0;

        // trailing `true` closes a run ending at the last sector
        for (i, used) in self.used.iter().copied().chain(std::iter::once(true)).enumerate() {
            if !used {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
                continue;
            }
            if run_len >= count && best.map_or(true, |(_, len)| run_len < len) {
                best = Some((run_start, run_len));
            }
            run_len = 0;
        }

        best.map(|(start, _)| start as u32)
    }
}
