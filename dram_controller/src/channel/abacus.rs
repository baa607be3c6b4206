//! ABACUS: a per-row activation counter with a same-address-victim bitmask.
//! Counts an ACTIVATE toward a row's `rac` counter only when the
//! issuing bank was not the last one to touch that row (`sav`), so a single
//! bank hammering its own row repeatedly doesn't trip the counter.

use crate::config::Config;
use crate::stats::{Counter, StatsSink};

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    rac: u32,
    sav: u64,
}

#[derive(Debug, Clone)]
pub struct Abacus {
    table: Vec<Entry>,
    pending: Vec<u32>,
}

impl Abacus {
    pub fn new(cfg: &Config) -> Self {
        Self {
            table: vec![Entry::default(); cfg.rows as usize],
            pending: Vec::new(),
        }
    }

    fn bank_mask(cfg: &Config, rank: u32, bankgroup: u32, bank: u32) -> u64 {
        let bank_idx = rank * cfg.bankgroups * cfg.banks_per_group + bankgroup * cfg.banks_per_group + bank;
        1u64 << bank_idx
    }

    /// Called on every ACTIVATE. Returns `true` (and a row to queue for
    /// DRFM against every bank) once the row's `rac` counter crosses
    /// `abacus_th`.
    pub fn on_activate(&mut self, cfg: &Config, rank: u32, bankgroup: u32, bank: u32, rowid: u32) -> bool {
        let mask = Self::bank_mask(cfg, rank, bankgroup, bank);
        let entry = &mut self.table[rowid as usize];
        if entry.sav & mask == 0 {
            entry.sav |= mask;
        } else {
            entry.rac += 1;
            entry.sav = mask;
        }

        if entry.rac >= cfg.abacus_th {
            self.pending.push(rowid);
            true
        } else {
            false
        }
    }

    pub fn mitigate(&mut self) -> Option<u32> {
        if self.pending.is_empty() {
            return None;
        }
        let rowid = self.pending.remove(0);
        self.table[rowid as usize] = Entry::default();
        Some(rowid)
    }

    /// Periodic reset applied on every rank/bankset refresh, rotating a
    /// `1/refchunks` slice of the row table back to zero per tick (the
    /// same slice a bank's own PRAC table rotates on that refresh, keyed
    /// by the issuing bank's `ref_idx`).
    pub fn on_refresh(&mut self, cfg: &Config, ref_idx: u32, stats: &mut impl StatsSink) {
        let start = ref_idx % cfg.refchunks.max(1);
        let rows_per_ref = self.table.len() as u32 / cfg.refchunks.max(1);
        for i in 0..rows_per_ref {
            let idx = (start * rows_per_ref + i) as usize;
            if idx < self.table.len() {
                self.table[idx] = Entry::default();
            }
        }
        stats.increment(Counter::AbacusResets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::NullSink;

    fn cfg() -> Config {
        Config {
            abacus_mode: true,
            abacus_th: 2,
            rows: 8,
            ranks: 1,
            bankgroups: 1,
            banks_per_group: 2,
            ..Config::default()
        }
    }

    #[test]
    fn alternating_banks_increment_rac() {
        let cfg = cfg();
        let mut abacus = Abacus::new(&cfg);
        assert!(!abacus.on_activate(&cfg, 0, 0, 0, 3));
        assert!(abacus.on_activate(&cfg, 0, 0, 1, 3));
    }

    #[test]
    fn same_bank_repeat_does_not_increment_rac() {
        let cfg = cfg();
        let mut abacus = Abacus::new(&cfg);
        abacus.on_activate(&cfg, 0, 0, 0, 3);
        assert!(!abacus.on_activate(&cfg, 0, 0, 0, 3));
        assert_eq!(abacus.table[3].rac, 0);
    }

    #[test]
    fn mitigate_drains_fifo_and_clears_entry() {
        let cfg = cfg();
        let mut abacus = Abacus::new(&cfg);
        abacus.on_activate(&cfg, 0, 0, 0, 3);
        abacus.on_activate(&cfg, 0, 0, 1, 3);
        assert_eq!(abacus.mitigate(), Some(3));
        assert_eq!(abacus.table[3].rac, 0);
    }

    #[test]
    fn refresh_resets_rotating_slice() {
        let cfg = cfg();
        let mut abacus = Abacus::new(&cfg);
        let mut stats = NullSink;
        abacus.on_activate(&cfg, 0, 0, 0, 0);
        abacus.on_refresh(&cfg, 0, &mut stats);
        assert_eq!(abacus.table[0].sav, 0);
    }
}
