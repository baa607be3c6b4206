//! Per-bank RowHammer mitigation engines: MINT, PARA, Graphene, Hydra, MOAT.
//!
//! DREAM and ABACUS track aggressor rows at channel scope (they need to see
//! every bank's activations to compute a shared index), so they live in
//! [`crate::channel::dream`] and [`crate::channel::abacus`] instead; what
//! lands here is deposited into a bank's [`DrfmQueue`] the same way these
//! five do.
//!
//! A bank runs at most one of these at a time; PRAC's per-row activation
//! counters are a plain always-on field on [`crate::bank::Bank`], not a
//! variant here, since every bank counts activations regardless of which
//! engine (if any) is active.

use crate::stats::{Counter, StatsSink};

/// Bound on the small, always-resident per-bank tracking tables (the DRFM
/// sampling queue, Graphene's count table, MINT's activation window). A
/// `Config` is rejected at validation time if it asks for a larger window;
/// per-row tables (PRAC, Hydra's GCT/RCC) are unrelated and unbounded by
/// this constant.
pub const MAX_SAMPLER_CAP: usize = 64;

type SamplerVec<T> = heapless::Vec<T, MAX_SAMPLER_CAP>;

/// One candidate row queued for a future DRFM, with the number of times
/// it's been re-activated since being queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrfmEntry {
    pub rowid: u32,
    pub ctr: u16,
}

/// The bank-local DRFM sampling queue shared by every mitigator below.
/// Each engine decides what to insert; draining always uses the same
/// max-counter, tie-to-head selection.
#[derive(Debug, Clone, Default)]
pub struct DrfmQueue {
    entries: SamplerVec<DrfmEntry>,
}

impl DrfmQueue {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a freshly-sampled row at counter zero. Silently drops the
    /// insert if the queue is already at `MAX_SAMPLER_CAP` capacity: callers
    /// are expected to have checked [`crate::bank::Bank::is_sampler_full`]
    /// first.
    pub fn insert(&mut self, rowid: u32) {
        let _ = self.entries.push(DrfmEntry { rowid, ctr: 0 });
    }

    /// Bump the re-activation counter of `rowid` if it's currently queued.
    pub fn bump(&mut self, rowid: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.rowid == rowid) {
            entry.ctr += 1;
        }
    }

    pub fn max_ctr(&self) -> Option<u16> {
        self.entries.iter().map(|e| e.ctr).max()
    }

    /// Remove and return the highest-counter entry, ties going to the
    /// oldest (head) entry. Increments `mitig_used`/`mitig_wasted` on the
    /// sink depending on whether anything was queued.
    pub fn drain_highest(&mut self, stats: &mut impl StatsSink) -> Option<u32> {
        if self.entries.is_empty() {
            tracing::warn!("DRFM fired with an empty sampler queue, nothing to protect");
            stats.increment(Counter::MitigWasted);
            return None;
        }
        let head_ctr = self.entries[0].ctr;
        let max_ctr = self.max_ctr().unwrap_or(head_ctr);
        let idx = if max_ctr <= head_ctr {
            0
        } else {
            self.entries
                .iter()
                .position(|e| e.ctr == max_ctr)
                .unwrap_or(0)
        };
        let victim = self.entries.swap_remove(idx);
        stats.increment(Counter::MitigUsed);
        Some(victim.rowid)
    }
}

#[derive(Debug, Clone)]
struct GrapheneEntry {
    rowid: u32,
    ctr: u32,
}

/// A bank's single active mitigation engine, or none. Dispatched by `match`
/// rather than `dyn Trait`: the set of engines is closed and each has
/// distinct per-row state shapes, so a trait object buys nothing but
/// indirection.
#[derive(Debug, Clone)]
pub enum Mitigator {
    None,
    Mint {
        window: SamplerVec<u32>,
        window_size: u32,
    },
    Para {
        probability: f64,
    },
    Graphene {
        table: heapless::Vec<GrapheneEntry, MAX_SAMPLER_CAP>,
        capacity: usize,
        spill_counter: u32,
        threshold: u32,
    },
    Hydra {
        gct: Vec<u32>,
        gct_valid: Vec<bool>,
        counts: Vec<u32>,
        rows_per_gct: u32,
        gct_size: u32,
        gct_threshold: u32,
        threshold: u32,
    },
    Moat {
        max_prac_idx: Option<u32>,
        threshold: u32,
    },
}

impl Mitigator {
    pub fn none() -> Self {
        Self::None
    }

    pub fn mint(window_size: u32) -> Self {
        Self::Mint {
            window: SamplerVec::new(),
            window_size,
        }
    }

    pub fn para(probability: f64) -> Self {
        Self::Para { probability }
    }

    pub fn graphene(capacity: usize, threshold: u32) -> Self {
        Self::Graphene {
            table: heapless::Vec::new(),
            capacity: capacity.min(MAX_SAMPLER_CAP),
            spill_counter: 0,
            threshold,
        }
    }

    pub fn hydra(rows: u32, gct_size: u32, gct_threshold: u32, threshold: u32) -> Self {
        Self::Hydra {
            gct: vec![0; gct_size as usize],
            gct_valid: vec![true; gct_size as usize],
            counts: vec![0; rows as usize],
            rows_per_gct: rows / gct_size.max(1),
            gct_size,
            gct_threshold,
            threshold,
        }
    }

    pub fn moat(threshold: u32) -> Self {
        Self::Moat {
            max_prac_idx: None,
            threshold,
        }
    }

    /// Called on every ACTIVATE, before `drfm_q` insertion is decided.
    /// Returns the row count it observed, used only by Hydra to drive its
    /// RCC lookup separately via [`Self::hydra_check_rcc`].
    pub fn pre_act(
        &mut self,
        rowid: u32,
        hex_addr: i64,
        drfm_q: &mut DrfmQueue,
        rng: &mut impl FnMut() -> f64,
        stats: &mut impl StatsSink,
    ) {
        match self {
            Self::None | Self::Moat { .. } => {}
            Self::Mint { window, window_size } => {
                let _ = window.push(rowid);
                if window.len() >= *window_size as usize {
                    let pick_idx = (rng() * window.len() as f64) as usize % window.len().max(1);
                    let selected = window[pick_idx.min(window.len() - 1)];
                    window.clear();
                    drfm_q.insert(selected);
                }
            }
            Self::Para { probability } => {
                if rng() < *probability {
                    drfm_q.insert(rowid);
                }
            }
            Self::Graphene {
                table,
                capacity,
                spill_counter,
                threshold,
            } => {
                if let Some(entry) = table.iter_mut().find(|e| e.rowid == rowid) {
                    entry.ctr += 1;
                } else if table.len() < *capacity {
                    let _ = table.push(GrapheneEntry { rowid, ctr: 1 });
                } else if let Some(entry) = table.iter_mut().find(|e| e.ctr == *spill_counter) {
                    entry.rowid = rowid;
                    entry.ctr = *spill_counter + 1;
                } else {
                    *spill_counter += 1;
                    stats.increment(Counter::GrapheneSpills);
                }
                if let Some(entry) = table.iter().find(|e| e.ctr >= *threshold) {
                    drfm_q.insert(entry.rowid);
                }
            }
            Self::Hydra {
                gct,
                gct_valid,
                counts,
                rows_per_gct,
                gct_size,
                gct_threshold,
                threshold,
            } => {
                let gct_idx = (rowid % *gct_size) as usize;
                if gct_valid[gct_idx] {
                    gct[gct_idx] += 1;
                } else {
                    counts[rowid as usize] += 1;
                    let _ = hex_addr;
                }
                if gct[gct_idx] >= *gct_threshold && gct_valid[gct_idx] {
                    gct_valid[gct_idx] = false;
                    for i in 0..*rows_per_gct {
                        counts[(i * *gct_size + gct_idx as u32) as usize] = *gct_threshold;
                    }
                }
                if gct_valid[gct_idx] {
                    return;
                }
                if counts[rowid as usize] >= *threshold {
                    stats.increment(Counter::HydraResets);
                    drfm_q.insert(rowid);
                }
            }
        }
    }

    /// Hydra's RCC dedup check, consulted by a channel before it also
    /// enqueues a synthesized read/write for the same row. Returns `true`
    /// when the access already hit the row-copy cache and no synthesized
    /// traffic is needed.
    pub fn hydra_check_rcc(&self, rowid: u32) -> bool {
        match self {
            Self::Hydra {
                gct_valid, gct_size, ..
            } => gct_valid[(rowid % *gct_size) as usize],
            _ => true,
        }
    }

    /// Called by the caller only when `ref_idx` has wrapped back to row
    /// zero, i.e. once per full-table refresh sweep rather than once per
    /// refresh tick.
    pub fn on_refresh_wrap(&mut self, rows: u32, stats: &mut impl StatsSink) {
        match self {
            Self::None | Self::Mint { .. } | Self::Para { .. } => {}
            Self::Graphene {
                table,
                spill_counter,
                ..
            } => {
                table.clear();
                *spill_counter = 0;
                stats.increment(Counter::GrapheneResets);
            }
            Self::Hydra {
                gct,
                gct_valid,
                counts,
                gct_size,
                ..
            } => {
                gct.iter_mut().for_each(|v| *v = 0);
                gct_valid.iter_mut().for_each(|v| *v = true);
                counts.clear();
                counts.resize(rows as usize, 0);
                let _ = gct_size;
                stats.increment(Counter::HydraResets);
            }
            Self::Moat { .. } => {
                // MOAT's refresh-triggered reset depends on which rows a
                // given refresh sweep touches, not the wrap itself; see
                // `moat_on_refresh`.
            }
        }
    }

    /// MOAT's per-activation tracking: remember the row with the highest
    /// PRAC count seen so far.
    pub fn moat_on_activate(&mut self, rowid: u32, prac: &[u32]) {
        if let Self::Moat { max_prac_idx, .. } = self {
            let higher = match *max_prac_idx {
                None => true,
                Some(current) => prac[rowid as usize] > prac[current as usize],
            };
            if higher {
                *max_prac_idx = Some(rowid);
            }
        }
    }

    /// Clear MOAT's tracked row if the refresh sweep just cleared its PRAC
    /// counter out from under it.
    pub fn moat_on_refresh(&mut self, ref_idx: u32, rows_refreshed: u32) {
        if let Self::Moat { max_prac_idx, .. } = self {
            if let Some(idx) = *max_prac_idx {
                if idx >= ref_idx && idx < ref_idx + rows_refreshed {
                    *max_prac_idx = None;
                }
            }
        }
    }

    /// MOAT's ALERT gate: the tracked row's PRAC count exceeds its threshold.
    pub fn moat_alert(&self, prac: &[u32]) -> bool {
        match self {
            Self::Moat {
                max_prac_idx,
                threshold,
            } => max_prac_idx.is_some_and(|idx| prac[idx as usize] > *threshold),
            _ => false,
        }
    }

    /// Drains one victim from `drfm_q` (Mint/Para/Abacus/Graphene/Hydra all
    /// route through the same max-counter selection) and performs whatever
    /// per-engine bookkeeping the drain implies: Graphene removes its
    /// matching table entry, Hydra zeroes the row's observed count.
    pub fn mitigate(&mut self, drfm_q: &mut DrfmQueue, stats: &mut impl StatsSink) -> Option<u32> {
        if matches!(self, Self::None | Self::Moat { .. }) {
            return None;
        }
        let rowid = drfm_q.drain_highest(stats)?;
        match self {
            Self::Graphene { table, .. } => {
                if let Some(pos) = table.iter().position(|e| e.rowid == rowid) {
                    table.swap_remove(pos);
                }
            }
            Self::Hydra { counts, .. } => {
                counts[rowid as usize] = 0;
            }
            _ => {}
        }
        Some(rowid)
    }

    /// MOAT mitigates in place (no queue involvement): zero the tracked
    /// row's PRAC count and bump its ±1/±2 row neighbors, clamped at the
    /// array boundary.
    pub fn moat_mitigate(&mut self, prac: &mut [u32]) {
        let Self::Moat { max_prac_idx, .. } = self else {
            return;
        };
        let Some(idx) = max_prac_idx.take() else {
            return;
        };
        let idx = idx as usize;
        prac[idx] = 0;
        if idx >= 1 {
            prac[idx - 1] += 1;
        }
        if idx >= 2 {
            prac[idx - 2] += 1;
        }
        if idx + 1 < prac.len() {
            prac[idx + 1] += 1;
        }
        if idx + 2 < prac.len() {
            prac[idx + 2] += 1;
        }
    }
}
