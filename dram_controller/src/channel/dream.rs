//! DREAM: a channel-wide, time/space-sampled activation counter.
//!
//! Every ACTIVATE maps to one slot of a `tusc` table shared by the whole
//! channel, via one of three index-mapping schemes (set-associative,
//! staggered, random). When a slot crosses threshold, DRFM is queued for
//! every row that maps to it across every bank in the channel.

use crate::config::{Config, DreamPolicy};
use crate::stats::{Counter, StatsSink};

#[derive(Debug, Clone)]
pub struct Dream {
    tusc: Vec<u32>,
    tusc_prev: Vec<u32>,
    tusc_size: u32,
    random_masks: Vec<u32>,
    pending: Vec<u32>,
}

/// One DRFM target DREAM wants inserted everywhere it maps to.
pub struct DreamTarget {
    pub rank: u32,
    pub bankgroup: u32,
    pub bank: u32,
    pub row: u32,
}

impl Dream {
    pub fn new(cfg: &Config, rng: &mut impl FnMut() -> f64) -> Self {
        let tusc_size = (cfg.rows / cfg.dream_k).max(1);
        let total_banks = cfg.ranks * cfg.bankgroups * cfg.banks_per_group;
        let mask_count = (total_banks * cfg.dream_k) as usize;
        let random_masks = (0..mask_count)
            .map(|_| (rng() * tusc_size as f64) as u32 % tusc_size)
            .collect();
        Self {
            tusc: vec![0; tusc_size as usize],
            tusc_prev: vec![0; tusc_size as usize],
            tusc_size,
            random_masks,
            pending: Vec::new(),
        }
    }

    fn bank_idx(cfg: &Config, rank: u32, bankgroup: u32, bank: u32) -> u32 {
        rank * cfg.bankgroups * cfg.banks_per_group + bankgroup * cfg.banks_per_group + bank
    }

    fn tusc_idx(&self, cfg: &Config, rank: u32, bankgroup: u32, bank: u32, rowid: u32) -> u32 {
        let groupid = rowid / cfg.dream_k;
        let bank_idx = Self::bank_idx(cfg, rank, bankgroup, bank);
        let total_banks = cfg.ranks * cfg.bankgroups * cfg.banks_per_group;
        let row_num = rowid % cfg.dream_k;

        match cfg.dream_policy {
            DreamPolicy::SetAssociative => groupid,
            DreamPolicy::Staggered => {
                let rowid = rowid % self.tusc_size;
                (rowid + self.tusc_size - bank_idx % self.tusc_size) % self.tusc_size
            }
            DreamPolicy::Random => groupid ^ self.random_masks[(bank_idx + row_num * total_banks) as usize],
        }
    }

    fn row_idx(&self, cfg: &Config, rank: u32, bankgroup: u32, bank: u32, tusc_idx: u32, row_num: u32) -> u32 {
        let bank_idx = Self::bank_idx(cfg, rank, bankgroup, bank);
        let total_banks = cfg.ranks * cfg.bankgroups * cfg.banks_per_group;

        match cfg.dream_policy {
            DreamPolicy::SetAssociative => tusc_idx * cfg.dream_k + row_num,
            DreamPolicy::Staggered => (tusc_idx + bank_idx + row_num * self.tusc_size) % cfg.rows,
            DreamPolicy::Random => (tusc_idx ^ self.random_masks[(bank_idx + row_num * total_banks) as usize]) * cfg.dream_k + row_num,
        }
    }

    /// Called on every ACTIVATE. Bumps the mapped slot and, if it has
    /// crossed threshold, returns every `(rank, bankgroup, bank, row)`
    /// DRFM target mapped to that slot across the whole channel.
    pub fn on_activate(&mut self, cfg: &Config, rank: u32, bankgroup: u32, bank: u32, rowid: u32) -> Vec<DreamTarget> {
        let idx = self.tusc_idx(cfg, rank, bankgroup, bank, rowid) as usize;
        self.tusc[idx] += 1;

        let mut counter_val = self.tusc[idx];
        let mut threshold = cfg.dream_th;
        if cfg.dream_prev_enable {
            counter_val += self.tusc_prev[idx];
            threshold *= 2;
        }

        if counter_val < threshold {
            return Vec::new();
        }

        let mut targets = Vec::new();
        for i in 0..cfg.ranks {
            for j in 0..cfg.bankgroups {
                for k in 0..cfg.banks_per_group {
                    for l in 0..cfg.dream_k {
                        let row = self.row_idx(cfg, i, j, k, idx as u32, l);
                        targets.push(DreamTarget {
                            rank: i,
                            bankgroup: j,
                            bank: k,
                            row,
                        });
                    }
                }
            }
        }
        for _ in 0..cfg.dream_k {
            self.pending.push(idx as u32);
        }
        targets
    }

    /// Drains one pending slot, rolling its count into `tusc_prev` and
    /// resetting it to zero. Called on each DRFM issued for a DREAM target.
    pub fn mitigate(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let idx = self.pending.remove(0) as usize;
        self.tusc_prev[idx] = self.tusc[idx];
        self.tusc[idx] = 0;
    }

    /// Periodic decay applied on every rank/bankset refresh, rolling a
    /// `1/dream_reset` fraction of the table back to zero (rotating through
    /// the table across `refchunks` ticks, keyed by the issuing bank's
    /// `ref_idx`).
    pub fn on_refresh(&mut self, cfg: &Config, ref_idx: u32, stats: &mut impl StatsSink) {
        stats.increment(Counter::DreamResets);
        let factor = cfg.dream_reset.max(1);
        let factored_ref_idx = ref_idx % (cfg.refchunks / factor).max(1);
        let rows_per_ref = factor * (self.tusc_size / cfg.refchunks.max(1));
        for i in 0..rows_per_ref {
            let index = (factored_ref_idx * rows_per_ref + i) as usize;
            if index < self.tusc.len() {
                self.tusc_prev[index] = self.tusc[index];
                self.tusc[index] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
            dream_mode: true,
            dream_k: 2,
            dream_th: 3,
            rows: 16,
            ranks: 1,
            bankgroups: 1,
            banks_per_group: 1,
            ..Config::default()
        }
    }

    #[test]
    fn set_associative_groups_by_dream_k() {
        let cfg = cfg();
        let mut rng = || 0.0;
        let mut dream = Dream::new(&cfg, &mut rng);
        dream.on_activate(&cfg, 0, 0, 0, 0);
        dream.on_activate(&cfg, 0, 0, 0, 1);
        assert_eq!(dream.tusc[0], 2);
    }

    #[test]
    fn threshold_crossing_returns_all_dream_k_targets() {
        let cfg = cfg();
        let mut rng = || 0.0;
        let mut dream = Dream::new(&cfg, &mut rng);
        dream.on_activate(&cfg, 0, 0, 0, 0);
        dream.on_activate(&cfg, 0, 0, 0, 1);
        let targets = dream.on_activate(&cfg, 0, 0, 0, 0);
        assert_eq!(targets.len(), cfg.dream_k as usize);
    }

    #[test]
    fn mitigate_rolls_slot_into_prev_and_clears_it() {
        let cfg = cfg();
        let mut rng = || 0.0;
        let mut dream = Dream::new(&cfg, &mut rng);
        dream.on_activate(&cfg, 0, 0, 0, 0);
        dream.on_activate(&cfg, 0, 0, 0, 1);
        dream.on_activate(&cfg, 0, 0, 0, 0);
        dream.mitigate();
        assert_eq!(dream.tusc[0], 0);
        assert!(dream.tusc_prev[0] > 0);
    }
}
