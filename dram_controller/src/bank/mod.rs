//! Per-bank row-buffer state machine.

pub mod mitigation;

use crate::command::{Address, Command, CommandType};
use crate::config::{Config, RfmMode};
use crate::error::fatal;
use crate::stats::{Counter, StatsSink};
use mitigation::{DrfmQueue, Mitigator};

/// A bank's row-buffer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Closed,
    Open,
    Sref,
}

/// One bank's row buffer, timing table, and (at most one) active RowHammer
/// mitigation engine.
#[derive(Debug, Clone)]
pub struct Bank {
    pub rank: i32,
    pub bankgroup: i32,
    pub bank: i32,

    state: RowState,
    cmd_timing: [u64; CommandType::COUNT],
    last_cmd: Option<Command>,
    open_row: i32,
    row_hit_count: u32,

    raa_ctr: i32,
    acts_counter: u32,
    ref_idx: u32,
    fgr_counter: u32,

    prac: Vec<u32>,
    max_prac_val: u32,

    drfm_q: DrfmQueue,
    drfm_issued: bool,

    mitigator: Mitigator,
}

impl Bank {
    pub fn new(cfg: &Config, rank: i32, bankgroup: i32, bank: i32) -> Self {
        let mitigator = if cfg.dream_mode {
            Mitigator::none()
        } else if cfg.mint_mode {
            Mitigator::mint(cfg.mint_window)
        } else if cfg.para_mode {
            Mitigator::para(cfg.para_prob)
        } else if cfg.graphene_mode {
            Mitigator::graphene(cfg.graphene_table_size as usize, cfg.graphene_th)
        } else if cfg.hydra_mode {
            Mitigator::hydra(cfg.rows, cfg.hydra_gct_size, cfg.hydra_gct_th, cfg.hydra_th)
        } else if cfg.moat_mode {
            Mitigator::moat(cfg.moatth)
        } else {
            Mitigator::none()
        };

        Self {
            rank,
            bankgroup,
            bank,
            state: RowState::Closed,
            cmd_timing: [0; CommandType::COUNT],
            last_cmd: None,
            open_row: -1,
            row_hit_count: 0,
            raa_ctr: 0,
            acts_counter: 0,
            ref_idx: 0,
            fgr_counter: 0,
            prac: vec![0; cfg.rows as usize],
            max_prac_val: 0,
            drfm_q: DrfmQueue::default(),
            drfm_issued: false,
            mitigator,
        }
    }

    pub fn is_row_open(&self) -> bool {
        self.state == RowState::Open
    }

    pub fn open_row(&self) -> i32 {
        self.open_row
    }

    pub fn row_hit_count(&self) -> u32 {
        self.row_hit_count
    }

    pub fn raa_ctr(&self) -> i32 {
        self.raa_ctr
    }

    /// The row index a refresh just rotated past, used by the channel's
    /// DREAM/ABACUS engines to key their own rotating resets to the same
    /// cadence as this bank's PRAC table.
    pub fn ref_idx(&self) -> u32 {
        self.ref_idx
    }

    pub fn is_self_refreshing(&self) -> bool {
        self.state == RowState::Sref
    }

    pub fn is_in_ref(&self) -> bool {
        self.last_cmd.is_some_and(|c| c.cmd_type.is_refresh())
    }

    pub fn is_in_drfm(&self) -> bool {
        self.last_cmd.is_some_and(|c| c.cmd_type.is_drfm())
    }

    /// Whether the bank's DRFM sampling queue is at capacity or holds an
    /// entry past its re-activation threshold; callers must check this
    /// before queuing another ACTIVATE while `drfm_issued` would otherwise
    /// block it.
    pub fn is_sampler_full(&self, cfg: &Config) -> bool {
        if cfg.drfm_mode.is_none() {
            return false;
        }
        if self.drfm_q.len() >= cfg.drfm_qsize as usize {
            return true;
        }
        self.drfm_q.max_ctr().is_some_and(|ctr| ctr as u32 >= cfg.drfm_qth)
    }

    pub fn mark_drfm_issued(&mut self) {
        self.drfm_issued = true;
    }

    pub fn insert_drfm(&mut self, rowid: u32, cfg: &Config) {
        if cfg.drfm_mode.is_none() {
            return;
        }
        self.drfm_q.insert(rowid);
    }

    /// ALERT gate (MOAT only): the tracked high-PRAC row has exceeded its
    /// threshold.
    pub fn check_alert(&self) -> bool {
        self.mitigator.moat_alert(&self.prac)
    }

    /// Runs every per-bank mitigator's pre-activation hook and reports
    /// whether the sampler is now full (the caller uses this to gate
    /// further ACTIVATEs into this bank while a DRFM drain is pending).
    pub fn pre_act(&mut self, cmd: &Command, cfg: &Config, rng: &mut impl FnMut() -> f64, stats: &mut impl StatsSink) -> bool {
        let rowid = cmd.addr.row as u32;
        self.mitigator
            .pre_act(rowid, cmd.hex_addr, &mut self.drfm_q, rng, stats);
        self.is_sampler_full(cfg)
    }

    /// Hydra's RCC dedup check: `true` means the access already has a
    /// valid GCT bucket and no synthesized RCC read/write is needed.
    pub fn hydra_check_rcc(&self, row: i32) -> bool {
        self.mitigator.hydra_check_rcc(row as u32)
    }

    /// The command the queue may issue for `cmd`'s address in this bank at
    /// `clk`, given this bank's current row-buffer state and timing table.
    /// `None` covers both "not the right type yet" (still needs PRECHARGE,
    /// SREF_EXIT, etc.) and "right type, but too early" -- a caller only
    /// cares whether it can issue something right now, not which case it is.
    pub fn get_ready_command(&self, cmd: &Command, clk: u64, cfg: &Config) -> Option<Command> {
        let rfm_th = if matches!(cfg.rfm_policy, crate::config::MitigationPolicy::Lazy) {
            cfg.raammt
        } else {
            cfg.raaimt
        };

        let required = match self.state {
            RowState::Closed => match cmd.cmd_type {
                CommandType::Read
                | CommandType::ReadPrecharge
                | CommandType::Write
                | CommandType::WritePrecharge => {
                    if cfg.rfm_mode == RfmMode::SameBank && self.raa_ctr >= rfm_th as i32 {
                        tracing::debug!(rank = self.rank, bankgroup = self.bankgroup, bank = self.bank, raa_ctr = self.raa_ctr, "RFM (same-bank) triggered");
                        CommandType::RfmSb
                    } else if cfg.rfm_mode == RfmMode::AllBank && self.raa_ctr >= rfm_th as i32 {
                        tracing::debug!(rank = self.rank, bankgroup = self.bankgroup, bank = self.bank, raa_ctr = self.raa_ctr, "RFM (all-bank) triggered");
                        CommandType::RfmAb
                    } else if self.drfm_issued {
                        return None;
                    } else {
                        CommandType::Activate
                    }
                }
                CommandType::RefreshBank
                | CommandType::RefSb
                | CommandType::RefAb
                | CommandType::SrefEnter
                | CommandType::RfmSb
                | CommandType::RfmAb
                | CommandType::DrfmB
                | CommandType::DrfmSb
                | CommandType::DrfmAb => cmd.cmd_type,
                other => fatal(&format!("bank in CLOSED state cannot service {other:?}")),
            },
            RowState::Open => match cmd.cmd_type {
                CommandType::Read
                | CommandType::ReadPrecharge
                | CommandType::Write
                | CommandType::WritePrecharge => {
                    if cmd.addr.row == self.open_row {
                        cmd.cmd_type
                    } else {
                        CommandType::Precharge
                    }
                }
                CommandType::RefreshBank | CommandType::DrfmB => CommandType::Precharge,
                CommandType::RefAb | CommandType::RfmAb | CommandType::DrfmAb | CommandType::SrefEnter => {
                    CommandType::PreAb
                }
                CommandType::RfmSb | CommandType::RefSb | CommandType::DrfmSb => CommandType::PreSb,
                other => fatal(&format!("bank in OPEN state cannot service {other:?}")),
            },
            RowState::Sref => match cmd.cmd_type {
                CommandType::Read
                | CommandType::ReadPrecharge
                | CommandType::Write
                | CommandType::WritePrecharge => CommandType::SrefExit,
                other => fatal(&format!("bank in SREF state cannot service {other:?}")),
            },
        };

        if clk >= self.cmd_timing[required as usize] {
            Some(Command::new(required, cmd.addr, cmd.hex_addr))
        } else {
            None
        }
    }

    pub fn update_timing(&mut self, cmd_type: CommandType, time: u64) {
        let slot = &mut self.cmd_timing[cmd_type as usize];
        *slot = (*slot).max(time);
    }

    /// Applies the state transition and bookkeeping for a command this
    /// bank just issued. `cfg`/`rng`/`stats` are only touched by the
    /// command classes that need them (refresh, ACTIVATE, DRFM drains).
    pub fn update_state(&mut self, cmd: &Command, cfg: &Config, stats: &mut impl StatsSink) {
        tracing::trace!(rank = self.rank, bankgroup = self.bankgroup, bank = self.bank, cmd = ?cmd.cmd_type, row = cmd.addr.row, "command issued");
        self.last_cmd = Some(*cmd);

        match self.state {
            RowState::Open => match cmd.cmd_type {
                CommandType::Read | CommandType::Write => self.row_hit_count += 1,
                CommandType::ReadPrecharge
                | CommandType::WritePrecharge
                | CommandType::Precharge
                | CommandType::PreAb
                | CommandType::PreSb => {
                    self.state = RowState::Closed;
                    self.open_row = -1;
                    self.row_hit_count = 0;
                }
                other => fatal(&format!("OPEN bank cannot transition on {other:?}")),
            },
            RowState::Closed => match cmd.cmd_type {
                CommandType::RefSb | CommandType::RefreshBank | CommandType::RefAb => {
                    self.on_refresh(cfg, stats);
                }
                CommandType::DrfmB | CommandType::DrfmSb | CommandType::DrfmAb => {
                    tracing::debug!(rank = self.rank, bankgroup = self.bankgroup, bank = self.bank, kind = ?cmd.cmd_type, "DRFM inserted");
                    // Whichever queue-based engine is active drains its
                    // highest-counter row; MOAT instead clears its tracked
                    // row directly, so both calls are harmless no-ops for
                    // the mitigator that isn't currently active.
                    self.mitigator.mitigate(&mut self.drfm_q, stats);
                    self.drfm_issued = false;
                    self.mitigator.moat_mitigate(&mut self.prac);
                    self.raa_ctr -= self.raa_ctr.min(cfg.rfm_raa_decrement as i32);
                }
                CommandType::RfmAb => {
                    self.mitigator.moat_mitigate(&mut self.prac);
                    self.raa_ctr -= self.raa_ctr.min(cfg.rfm_raa_decrement as i32);
                }
                CommandType::RfmSb => {
                    self.raa_ctr -= self.raa_ctr.min(cfg.rfm_raa_decrement as i32);
                }
                CommandType::Activate => self.on_activate(cmd, stats),
                CommandType::SrefEnter => self.state = RowState::Sref,
                CommandType::PreAb | CommandType::PreSb => {}
                other => fatal(&format!("CLOSED bank cannot transition on {other:?}")),
            },
            RowState::Sref => match cmd.cmd_type {
                CommandType::SrefExit => self.state = RowState::Closed,
                other => fatal(&format!("SREF bank cannot transition on {other:?}")),
            },
        }
    }

    fn on_refresh(&mut self, cfg: &Config, stats: &mut impl StatsSink) {
        self.fgr_counter = (self.fgr_counter + 1) % 2;
        self.raa_ctr -= self.raa_ctr.min(cfg.ref_raa_decrement as i32);

        if (cfg.fgr && self.fgr_counter == 0) || !cfg.fgr {
            self.acts_counter = 0;
            if self.ref_idx % cfg.rows == 0 {
                self.mitigator.on_refresh_wrap(cfg.rows, stats);
            }
            self.mitigator.moat_on_refresh(self.ref_idx, cfg.rows_refreshed);

            for i in 0..cfg.rows_refreshed {
                let idx = ((self.ref_idx + i) % cfg.rows) as usize;
                self.max_prac_val = self.max_prac_val.max(self.prac[idx]);
                self.prac[idx] = 0;
            }
            self.ref_idx = (self.ref_idx + cfg.rows_refreshed) % cfg.rows;
        }
    }

    fn on_activate(&mut self, cmd: &Command, stats: &mut impl StatsSink) {
        self.state = RowState::Open;
        self.open_row = cmd.addr.row;
        self.acts_counter += 1;
        stats.increment(Counter::Acts);
        self.raa_ctr += 1;

        let row = self.open_row as usize;
        self.prac[row] += 1;
        self.mitigator.moat_on_activate(self.open_row as u32, &self.prac);

        self.drfm_q.bump(self.open_row as u32);
    }
}

/// Address helper used by `Channel` to build the bank-scope probe it
/// presents to [`Bank::get_ready_command`].
pub fn probe_address(channel: i32, rank: i32, bankgroup: i32, bank: i32, row: i32, column: i32) -> Address {
    Address::new(channel, rank, bankgroup, bank, row, column)
}
