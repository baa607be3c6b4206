//! Per-channel coordination: the bank grid, the shared timing table, the
//! channel-scoped mitigation engines (DREAM, ABACUS, Hydra's RCC), the FAW
//! activation window, and the ALERT/ABO backoff state.
//!
//! Unlike [`crate::bank::Bank::get_ready_command`], which is a pure query,
//! this module's `get_ready_command` performs bookkeeping (pruning expired
//! FAW entries, synthesizing Hydra RCC traffic) as part of the readiness
//! check.

pub mod abacus;
pub mod dream;
pub mod hydra;

use crate::bank::Bank;
use crate::command::{Address, Command, CommandType};
use crate::config::{Config, DrfmMode, MitigationPolicy};
use crate::stats::{Counter, StatsSink};
use crate::timing::{Scope, Timing};
use abacus::Abacus;
use dream::Dream;
use hydra::{HydraQueues, HydraRcc, RccOutcome};

/// One DRAM channel: every rank/bankgroup/bank it owns, plus the state
/// shared across all of them.
pub struct Channel {
    id: i32,
    ranks: u32,
    bankgroups: u32,
    banks_per_group: u32,

    banks: Vec<Bank>,
    timing: Timing,

    dream: Option<Dream>,
    abacus: Option<Abacus>,
    hydra_rcc: Option<HydraRcc>,
    hydra_queues: HydraQueues,

    faw: Vec<Vec<u64>>,
    taw32: Vec<Vec<u64>>,

    alert_n: Vec<bool>,
    num_acts_abo: Vec<u32>,
    last_alert_clk: Vec<u64>,

    refresh_q: Vec<Command>,
    rfm_q: Vec<Command>,
    drfm_q: Vec<Command>,

    bursty_access_count: u32,
    last_bus_access_time: u64,
}

impl Channel {
    pub fn new(id: i32, cfg: &Config, rng: &mut impl FnMut() -> f64) -> Self {
        let mut banks = Vec::with_capacity((cfg.ranks * cfg.bankgroups * cfg.banks_per_group) as usize);
        for r in 0..cfg.ranks {
            for bg in 0..cfg.bankgroups {
                for b in 0..cfg.banks_per_group {
                    banks.push(Bank::new(cfg, r as i32, bg as i32, b as i32));
                }
            }
        }

        Self {
            id,
            ranks: cfg.ranks,
            bankgroups: cfg.bankgroups,
            banks_per_group: cfg.banks_per_group,
            banks,
            timing: Timing::new(cfg),
            dream: cfg.dream_mode.then(|| Dream::new(cfg, rng)),
            abacus: cfg.abacus_mode.then(|| Abacus::new(cfg)),
            hydra_rcc: cfg.hydra_mode.then(|| HydraRcc::new(cfg.hydra_rcc_sets, cfg.hydra_rcc_ways)),
            hydra_queues: HydraQueues::default(),
            faw: vec![Vec::new(); cfg.ranks as usize],
            taw32: vec![Vec::new(); cfg.ranks as usize],
            alert_n: vec![false; cfg.ranks as usize],
            num_acts_abo: vec![0; cfg.ranks as usize],
            last_alert_clk: vec![0; cfg.ranks as usize],
            refresh_q: Vec::new(),
            rfm_q: Vec::new(),
            drfm_q: Vec::new(),
            bursty_access_count: 0,
            last_bus_access_time: 0,
        }
    }

    fn idx(&self, rank: i32, bankgroup: i32, bank: i32) -> usize {
        (rank as u32 * self.bankgroups * self.banks_per_group + bankgroup as u32 * self.banks_per_group + bank as u32) as usize
    }

    /// Read-only view of one bank's state, for callers that need to inspect
    /// row-buffer/RAA/mitigation state directly rather than through
    /// `get_ready_command`.
    pub fn bank(&self, rank: i32, bankgroup: i32, bank: i32) -> &Bank {
        &self.banks[self.idx(rank, bankgroup, bank)]
    }

    /// Whether every bank in `rank` has its row buffer closed, i.e. the
    /// rank could enter self-refresh without first issuing a PRECHARGE.
    pub fn is_all_banks_idle_in_rank(&self, rank: i32) -> bool {
        self.banks_in_rank(rank).all(|idx| !self.banks[idx].is_row_open())
    }

    /// Whether every bank in `rank` is currently in self-refresh.
    pub fn is_rank_self_refreshing(&self, rank: i32) -> bool {
        self.banks_in_rank(rank).all(|idx| self.banks[idx].is_self_refreshing())
    }

    fn banks_in_rank(&self, rank: i32) -> impl Iterator<Item = usize> + '_ {
        let bankgroups = self.bankgroups;
        let banks_per_group = self.banks_per_group;
        (0..bankgroups).flat_map(move |bg| (0..banks_per_group).map(move |b| (bg, b))).map(move |(bg, b)| self.idx(rank, bg as i32, b as i32))
    }

    fn banks_in_bankset(&self, rank: i32, bank: i32) -> impl Iterator<Item = usize> + '_ {
        (0..self.bankgroups).map(move |bg| self.idx(rank, bg as i32, bank))
    }

    // ── Pending maintenance queues ──

    fn toggle(queue: &mut Vec<Command>, cmd: Command, need: bool) {
        let pos = queue.iter().position(|c| c.addr == cmd.addr && c.cmd_type == cmd.cmd_type);
        match (pos, need) {
            (None, true) => queue.push(cmd),
            (Some(i), false) => {
                queue.remove(i);
            }
            _ => {}
        }
    }

    pub fn need_bank_refresh(&mut self, rank: i32, bankgroup: i32, bank: i32, need: bool) {
        let addr = Address::bank_scope(self.id, rank, bankgroup, bank);
        Self::toggle(&mut self.refresh_q, Command::new(CommandType::RefreshBank, addr, -1), need);
    }

    pub fn need_bankset_refresh(&mut self, rank: i32, bank: i32, need: bool) {
        let addr = Address::bankset_scope(self.id, rank, bank);
        Self::toggle(&mut self.refresh_q, Command::new(CommandType::RefSb, addr, -1), need);
    }

    pub fn need_rank_refresh(&mut self, rank: i32, need: bool) {
        let addr = Address::rank_scope(self.id, rank);
        Self::toggle(&mut self.refresh_q, Command::new(CommandType::RefAb, addr, -1), need);
    }

    pub fn need_bankset_rfm(&mut self, rank: i32, bank: i32, need: bool) {
        let addr = Address::bankset_scope(self.id, rank, bank);
        Self::toggle(&mut self.rfm_q, Command::new(CommandType::RfmSb, addr, -1), need);
    }

    pub fn need_rank_rfm(&mut self, rank: i32, need: bool) {
        let addr = Address::rank_scope(self.id, rank);
        Self::toggle(&mut self.rfm_q, Command::new(CommandType::RfmAb, addr, -1), need);
    }

    pub fn need_bank_drfm(&mut self, rank: i32, bankgroup: i32, bank: i32, need: bool) {
        let addr = Address::bank_scope(self.id, rank, bankgroup, bank);
        Self::toggle(&mut self.drfm_q, Command::new(CommandType::DrfmB, addr, -1), need);
    }

    pub fn need_bankset_drfm(&mut self, rank: i32, bank: i32, need: bool) {
        let addr = Address::bankset_scope(self.id, rank, bank);
        Self::toggle(&mut self.drfm_q, Command::new(CommandType::DrfmSb, addr, -1), need);
    }

    pub fn need_rank_drfm(&mut self, rank: i32, need: bool) {
        let addr = Address::rank_scope(self.id, rank);
        Self::toggle(&mut self.drfm_q, Command::new(CommandType::DrfmAb, addr, -1), need);
    }

    fn announce_drfm(&mut self, rank: i32, bankgroup: i32, bank: i32, cfg: &Config) {
        match cfg.drfm_mode {
            Some(DrfmMode::Bank) => self.need_bank_drfm(rank, bankgroup, bank, true),
            Some(DrfmMode::Bankset) => self.need_bankset_drfm(rank, bank, true),
            Some(DrfmMode::Rank) => self.need_rank_drfm(rank, true),
            None => {}
        }
    }

    /// DREAM/ABACUS queue a row owned by a bank other than the one that
    /// just activated; insert it into that bank's own sampling queue, then
    /// announce the scheduling need at whatever scope `drfm_mode` uses.
    fn schedule_external_drfm(&mut self, rank: i32, bankgroup: i32, bank: i32, rowid: u32, cfg: &Config) {
        tracing::debug!(channel = self.id, rank, bankgroup, bank, rowid, "DRFM candidate sampled");
        let idx = self.idx(rank, bankgroup, bank);
        self.banks[idx].insert_drfm(rowid, cfg);
        self.announce_drfm(rank, bankgroup, bank, cfg);
    }

    /// Next scheduled maintenance command (refresh, RFM, or DRFM) whose
    /// target is ready to issue right now, highest-priority queue first.
    pub fn next_pending_command(&self, clk: u64, cfg: &Config) -> Option<Command> {
        for queue in [&self.refresh_q, &self.rfm_q, &self.drfm_q] {
            for cmd in queue {
                if self.get_ready_command_immut(cmd, clk, cfg).is_some() {
                    return Some(*cmd);
                }
            }
        }
        None
    }

    // ── FAW / 32AW sliding window ──

    fn faw_ready_peek(&self, rank: i32, clk: u64) -> bool {
        let window = &self.faw[rank as usize];
        window.iter().filter(|&&expiry| expiry > clk).count() < 4
    }

    fn taw32_ready_peek(&self, rank: i32, clk: u64, cfg: &Config) -> bool {
        if !cfg.protocol.is_gddr() {
            return true;
        }
        let window = &self.taw32[rank as usize];
        window.iter().filter(|&&expiry| expiry > clk).count() < 32
    }

    fn activation_window_ok(&self, rank: i32, clk: u64, cfg: &Config) -> bool {
        self.faw_ready_peek(rank, clk) && self.taw32_ready_peek(rank, clk, cfg)
    }

    fn update_activation_times(&mut self, rank: i32, clk: u64, cfg: &Config) {
        let faw = &mut self.faw[rank as usize];
        faw.retain(|&expiry| expiry > clk);
        faw.push(clk + cfg.t_faw as u64);
        if cfg.protocol.is_gddr() {
            let taw = &mut self.taw32[rank as usize];
            taw.retain(|&expiry| expiry > clk);
            taw.push(clk + cfg.t32aw as u64);
        }
    }

    // ── ALERT / ABO ──

    fn trigger_alert_if_needed(&mut self, rank: i32, bankgroup: i32, bank: i32, clk: u64, cfg: &Config, stats: &mut impl StatsSink) {
        if !cfg.alert_mode {
            return;
        }
        let idx = self.idx(rank, bankgroup, bank);
        if !self.banks[idx].check_alert() {
            return;
        }
        let r = rank as usize;
        self.num_acts_abo[r] += 1;
        if self.num_acts_abo[r] >= cfg.abo_delay_acts && !self.alert_n[r] {
            self.alert_n[r] = true;
            self.last_alert_clk[r] = clk;
            tracing::debug!(channel = self.id, rank, "ALERT/ABO asserted");
            stats.increment(Counter::NumAlerts);
        }
    }

    /// Synthesizes the RFMab an asserted ALERT owes once `tABO_act` clocks
    /// have elapsed since assertion. Called once per cycle by the driving
    /// loop, alongside `clear_expired_alerts`.
    pub fn trigger_abo_rfm_if_due(&mut self, clk: u64, cfg: &Config) {
        for r in 0..self.alert_n.len() {
            if self.alert_n[r] && clk >= self.last_alert_clk[r] + cfg.t_abo_act as u64 {
                self.need_rank_rfm(r as i32, true);
            }
        }
    }

    /// Clears an active ALERT once its programmed pulse width has elapsed.
    /// Called once per cycle by the driving loop.
    pub fn clear_expired_alerts(&mut self, clk: u64, cfg: &Config) {
        for r in 0..self.alert_n.len() {
            if self.alert_n[r] && clk >= self.last_alert_clk[r] + cfg.t_abo_pw as u64 {
                self.alert_n[r] = false;
                self.num_acts_abo[r] = 0;
            }
        }
    }

    fn track_bus_access(&mut self, clk: u64, cfg: &Config, stats: &mut impl StatsSink) {
        if clk.saturating_sub(self.last_bus_access_time) <= cfg.burst_cycle as u64 {
            self.bursty_access_count += 1;
        } else {
            self.bursty_access_count = 1;
        }
        self.last_bus_access_time = clk;
        stats.add_value(Counter::BurstyAccessCount, self.bursty_access_count as f64);
    }

    // ── Hydra RCC gate ──

    /// `true` once the synthesized RCC traffic for `row` has been queued
    /// (the caller must wait for it to drain before the real ACTIVATE can
    /// proceed); `false` means the row's GCT bucket is still valid and no
    /// RCC traffic is needed.
    fn hydra_gate(&mut self, rank: i32, bankgroup: i32, bank: i32, row: i32, cfg: &Config) -> bool {
        let idx = self.idx(rank, bankgroup, bank);
        if self.banks[idx].hydra_check_rcc(row) {
            return false;
        }
        let Some(rcc) = &mut self.hydra_rcc else {
            return false;
        };
        let set = (row as u64) % cfg.hydra_rcc_sets.max(1) as u64;
        let tag = row as u64;
        match rcc.probe(tag, set) {
            RccOutcome::Hit => false,
            RccOutcome::Miss => {
                self.hydra_queues.hydra_read(self.id, rank, bankgroup, bank, row);
                true
            }
            RccOutcome::Evict { evicted_tag } => {
                self.hydra_queues.hydra_read(self.id, rank, bankgroup, bank, row);
                self.hydra_queues.hydra_wb(self.id, rank, bankgroup, bank, evicted_tag as i32);
                true
            }
        }
    }

    /// A synthesized Hydra RCC read/write ready to issue ahead of any real
    /// request, or `None` if no RCC traffic is currently queued. Callers
    /// that issue the returned command must follow up with
    /// [`Self::pop_hydra_command`].
    pub fn next_hydra_command(&mut self, cfg: &Config) -> Option<Command> {
        self.hydra_queues.front(cfg.hydra_wbq_size).copied()
    }

    /// Removes whatever [`Self::next_hydra_command`] last returned, once
    /// the caller has issued it.
    pub fn pop_hydra_command(&mut self) {
        self.hydra_queues.pop_front();
    }

    // ── Readiness ──

    fn get_ready_command_immut(&self, cmd: &Command, clk: u64, cfg: &Config) -> Option<Command> {
        if cmd.cmd_type.is_rank_cmd() {
            return self.rank_scope_ready(cmd, clk, cfg, self.banks_in_rank(cmd.addr.rank).collect::<Vec<_>>());
        }
        if cmd.cmd_type.is_bankset_cmd() {
            return self.rank_scope_ready(cmd, clk, cfg, self.banks_in_bankset(cmd.addr.rank, cmd.addr.bank).collect::<Vec<_>>());
        }
        let idx = self.idx(cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank);
        let required = self.banks[idx].get_ready_command(cmd, clk, cfg)?;
        if required.cmd_type == CommandType::Activate && !self.activation_window_ok(cmd.addr.rank, clk, cfg) {
            return None;
        }
        if required.cmd_type == CommandType::Activate && cfg.alert_mode && self.alert_n[cmd.addr.rank as usize] {
            return None;
        }
        Some(required)
    }

    fn rank_scope_ready(&self, cmd: &Command, clk: u64, cfg: &Config, members: Vec<usize>) -> Option<Command> {
        let mut all_agree = true;
        for &idx in &members {
            match self.banks[idx].get_ready_command(cmd, clk, cfg) {
                None => {
                    all_agree = false;
                    continue;
                }
                Some(c) if c.cmd_type != cmd.cmd_type => {
                    all_agree = false;
                    if c.cmd_type.is_precharge() {
                        return Some(c);
                    }
                }
                Some(_) => {}
            }
        }
        if all_agree {
            Some(*cmd)
        } else {
            None
        }
    }

    /// The command the channel may issue for `cmd` right now, or `None` if
    /// nothing is ready. Mutates FAW bookkeeping and may synthesize Hydra
    /// RCC traffic as a side effect of the check.
    pub fn get_ready_command(&mut self, cmd: &Command, clk: u64, cfg: &Config) -> Option<Command> {
        if cfg.hydra_mode && !cmd.cmd_type.is_rank_cmd() && !cmd.cmd_type.is_bankset_cmd() {
            let idx = self.idx(cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank);
            if let Some(required) = self.banks[idx].get_ready_command(cmd, clk, cfg) {
                if required.cmd_type == CommandType::Activate
                    && self.hydra_gate(cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank, cmd.addr.row, cfg)
                {
                    return None;
                }
            }
        }
        self.get_ready_command_immut(cmd, clk, cfg)
    }

    // ── State transitions ──

    /// Applies the state transition for an issued command, including every
    /// bank it touches and the channel-level bookkeeping (FAW windows,
    /// ALERT/ABO, DREAM/ABACUS/Hydra hooks, maintenance-queue toggling).
    pub fn update_state(&mut self, cmd: &Command, clk: u64, cfg: &Config, rng: &mut impl FnMut() -> f64, stats: &mut impl StatsSink) {
        let (rank, bankgroup, bank) = (cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank);

        match cmd.cmd_type {
            CommandType::Activate => {
                let idx = self.idx(rank, bankgroup, bank);
                // Eager policy samples/evaluates this access before the
                // ACTIVATE commits to the bank's row-buffer state; Lazy
                // samples afterward. Both still mark `drfm_issued`/announce
                // the same cycle once the sampler reports full.
                let sampler_full = if matches!(cfg.drfm_policy, MitigationPolicy::Eager) {
                    let full = self.banks[idx].pre_act(cmd, cfg, rng, stats);
                    self.banks[idx].update_state(cmd, cfg, stats);
                    full
                } else {
                    self.banks[idx].update_state(cmd, cfg, stats);
                    self.banks[idx].pre_act(cmd, cfg, rng, stats)
                };
                self.update_activation_times(rank, clk, cfg);
                if sampler_full {
                    self.banks[idx].mark_drfm_issued();
                    self.announce_drfm(rank, bankgroup, bank, cfg);
                }
                self.trigger_alert_if_needed(rank, bankgroup, bank, clk, cfg, stats);

                let row = cmd.addr.row as u32;
                if let Some(abacus) = &mut self.abacus {
                    if abacus.on_activate(cfg, rank as u32, bankgroup as u32, bank as u32, row) {
                        self.schedule_external_drfm(rank, bankgroup, bank, row, cfg);
                    }
                }
                if let Some(dream) = &mut self.dream {
                    let targets = dream.on_activate(cfg, rank as u32, bankgroup as u32, bank as u32, row);
                    for t in targets {
                        self.schedule_external_drfm(t.rank as i32, t.bankgroup as i32, t.bank as i32, t.row, cfg);
                    }
                }
            }
            CommandType::Read | CommandType::Write | CommandType::ReadPrecharge | CommandType::WritePrecharge => {
                let idx = self.idx(rank, bankgroup, bank);
                self.banks[idx].update_state(cmd, cfg, stats);
                self.track_bus_access(clk, cfg, stats);
            }
            CommandType::Precharge => {
                let idx = self.idx(rank, bankgroup, bank);
                self.banks[idx].update_state(cmd, cfg, stats);
            }
            CommandType::PreAb => {
                for idx in self.banks_in_rank(rank).collect::<Vec<_>>() {
                    self.banks[idx].update_state(cmd, cfg, stats);
                }
            }
            CommandType::PreSb => {
                for idx in self.banks_in_bankset(rank, bank).collect::<Vec<_>>() {
                    self.banks[idx].update_state(cmd, cfg, stats);
                }
            }
            CommandType::RefreshBank => {
                self.need_bank_refresh(rank, bankgroup, bank, false);
                let idx = self.idx(rank, bankgroup, bank);
                self.banks[idx].update_state(cmd, cfg, stats);
            }
            CommandType::RefSb => {
                self.need_bankset_refresh(rank, bank, false);
                let mut ref_idx = 0;
                for idx in self.banks_in_bankset(rank, bank).collect::<Vec<_>>() {
                    self.banks[idx].update_state(cmd, cfg, stats);
                    ref_idx = self.banks[idx].ref_idx();
                }
                if let Some(dream) = &mut self.dream {
                    dream.on_refresh(cfg, ref_idx, stats);
                }
                if let Some(abacus) = &mut self.abacus {
                    abacus.on_refresh(cfg, ref_idx, stats);
                }
            }
            CommandType::RefAb => {
                self.need_rank_refresh(rank, false);
                let mut ref_idx = 0;
                for idx in self.banks_in_rank(rank).collect::<Vec<_>>() {
                    self.banks[idx].update_state(cmd, cfg, stats);
                    ref_idx = self.banks[idx].ref_idx();
                }
                if let Some(dream) = &mut self.dream {
                    dream.on_refresh(cfg, ref_idx, stats);
                }
                if let Some(abacus) = &mut self.abacus {
                    abacus.on_refresh(cfg, ref_idx, stats);
                }
            }
            CommandType::SrefEnter | CommandType::SrefExit => {
                for idx in self.banks_in_rank(rank).collect::<Vec<_>>() {
                    self.banks[idx].update_state(cmd, cfg, stats);
                }
            }
            CommandType::RfmAb => {
                self.need_rank_rfm(rank, false);
                for idx in self.banks_in_rank(rank).collect::<Vec<_>>() {
                    self.banks[idx].update_state(cmd, cfg, stats);
                }
            }
            CommandType::RfmSb => {
                self.need_bankset_rfm(rank, bank, false);
                for idx in self.banks_in_bankset(rank, bank).collect::<Vec<_>>() {
                    self.banks[idx].update_state(cmd, cfg, stats);
                }
            }
            CommandType::DrfmB => {
                self.need_bank_drfm(rank, bankgroup, bank, false);
                let idx = self.idx(rank, bankgroup, bank);
                self.banks[idx].update_state(cmd, cfg, stats);
                if let Some(dream) = &mut self.dream {
                    dream.mitigate();
                }
                if let Some(abacus) = &mut self.abacus {
                    abacus.mitigate();
                }
            }
            CommandType::DrfmSb => {
                self.need_bankset_drfm(rank, bank, false);
                for idx in self.banks_in_bankset(rank, bank).collect::<Vec<_>>() {
                    self.banks[idx].update_state(cmd, cfg, stats);
                }
                if let Some(dream) = &mut self.dream {
                    dream.mitigate();
                }
                if let Some(abacus) = &mut self.abacus {
                    abacus.mitigate();
                }
            }
            CommandType::DrfmAb => {
                self.need_rank_drfm(rank, false);
                for idx in self.banks_in_rank(rank).collect::<Vec<_>>() {
                    self.banks[idx].update_state(cmd, cfg, stats);
                }
                if let Some(dream) = &mut self.dream {
                    dream.mitigate();
                }
                if let Some(abacus) = &mut self.abacus {
                    abacus.mitigate();
                }
            }
        }
    }

    // ── Timing fan-out ──

    fn scope_targets(&self, scope: Scope, rank: i32, bankgroup: i32, bank: i32) -> Vec<usize> {
        match scope {
            Scope::SameBank => vec![self.idx(rank, bankgroup, bank)],
            Scope::OtherBanksSameBankgroup => (0..self.banks_per_group)
                .filter(|&b| b as i32 != bank)
                .map(|b| self.idx(rank, bankgroup, b as i32))
                .collect(),
            Scope::OtherBankgroupsSameRank => (0..self.bankgroups)
                .filter(|&bg| bg as i32 != bankgroup)
                .flat_map(|bg| (0..self.banks_per_group).map(move |b| (bg, b)))
                .map(|(bg, b)| self.idx(rank, bg as i32, b as i32))
                .collect(),
            Scope::OtherRanks => (0..self.ranks)
                .filter(|&r| r as i32 != rank)
                .map(|r| self.idx(r as i32, bankgroup, bank))
                .collect(),
            Scope::SameRank => self.banks_in_rank(rank).collect(),
            Scope::SameBankset => (0..self.bankgroups)
                .filter(|&bg| bg as i32 != bankgroup)
                .map(|bg| self.idx(rank, bg as i32, bank))
                .collect(),
            Scope::OtherBanksets => (0..self.bankgroups)
                .flat_map(|bg| (0..self.banks_per_group).filter(move |&b| b as i32 != bank).map(move |b| (bg, b)))
                .map(|(bg, b)| self.idx(rank, bg as i32, b as i32))
                .collect(),
        }
    }

    fn apply_scope(&mut self, from: CommandType, scope: Scope, rank: i32, bankgroup: i32, bank: i32, clk: u64) {
        let delays = self.timing.delays(from, scope);
        if delays.is_empty() {
            return;
        }
        let delays = delays.to_vec();
        let targets = self.scope_targets(scope, rank, bankgroup, bank);
        for (to_cmd, delay) in delays {
            for &t in &targets {
                self.banks[t].update_timing(to_cmd, clk + delay as u64);
            }
        }
    }

    /// Stamps every blocked-command delay this issued command implies,
    /// scope by scope. Each call is explicit and sequential rather than
    /// relying on fallthrough.
    pub fn update_timing(&mut self, cmd: &Command, clk: u64) {
        let (rank, bankgroup, bank) = (cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank);
        match cmd.cmd_type {
            CommandType::Activate => {
                self.apply_scope(cmd.cmd_type, Scope::SameBank, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::OtherBanksSameBankgroup, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::OtherBankgroupsSameRank, rank, bankgroup, bank, clk);
            }
            CommandType::Precharge | CommandType::PreAb | CommandType::PreSb => {
                self.apply_scope(cmd.cmd_type, Scope::SameBank, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::OtherBanksSameBankgroup, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::OtherBankgroupsSameRank, rank, bankgroup, bank, clk);
            }
            CommandType::Read | CommandType::ReadPrecharge | CommandType::Write | CommandType::WritePrecharge => {
                self.apply_scope(cmd.cmd_type, Scope::SameBank, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::OtherBanksSameBankgroup, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::OtherBankgroupsSameRank, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::OtherRanks, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::SameRank, rank, bankgroup, bank, clk);
            }
            CommandType::RefreshBank | CommandType::DrfmB => {
                self.apply_scope(cmd.cmd_type, Scope::SameBank, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::SameRank, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::OtherBanksSameBankgroup, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::OtherBankgroupsSameRank, rank, bankgroup, bank, clk);
            }
            CommandType::RfmAb
            | CommandType::RefAb
            | CommandType::DrfmAb
            | CommandType::SrefEnter
            | CommandType::SrefExit => {
                self.apply_scope(cmd.cmd_type, Scope::SameRank, rank, bankgroup, bank, clk);
            }
            CommandType::RefSb | CommandType::RfmSb | CommandType::DrfmSb => {
                self.apply_scope(cmd.cmd_type, Scope::SameBankset, rank, bankgroup, bank, clk);
                self.apply_scope(cmd.cmd_type, Scope::OtherBanksets, rank, bankgroup, bank, clk);
            }
        }
    }

    /// Convenience wrapper applying state then timing, the order every
    /// issued command must be processed in.
    pub fn update_timing_and_state(&mut self, cmd: &Command, clk: u64, cfg: &Config, rng: &mut impl FnMut() -> f64, stats: &mut impl StatsSink) {
        self.update_state(cmd, clk, cfg, rng, stats);
        self.update_timing(cmd, clk);
    }
}

/// Diagnostic dump of per-bank row/RAA/mitigation state, for a harness to
/// print when nothing has issued for an unreasonably long span.
impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Channel {} ({} rank(s), {} bankgroup(s), {} bank(s)/group):", self.id, self.ranks, self.bankgroups, self.banks_per_group)?;
        for bank in &self.banks {
            writeln!(
                f,
                "  rank={} bankgroup={} bank={} open={} row={} raa_ctr={} in_ref={} in_drfm={}",
                bank.rank,
                bank.bankgroup,
                bank.bank,
                bank.is_row_open(),
                bank.open_row(),
                bank.raa_ctr(),
                bank.is_in_ref(),
                bank.is_in_drfm(),
            )?;
        }
        writeln!(f, "  refresh_q={} rfm_q={} drfm_q={}", self.refresh_q.len(), self.rfm_q.len(), self.drfm_q.len())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::NullSink;

    fn cfg() -> Config {
        Config {
            ranks: 1,
            bankgroups: 2,
            banks_per_group: 2,
            ..Config::default()
        }
    }

    fn act(rank: i32, bankgroup: i32, bank: i32, row: i32) -> Command {
        Command::new(CommandType::Activate, Address::new(0, rank, bankgroup, bank, row, 0), 0x1000)
    }

    #[test]
    fn activate_then_read_ready_in_same_bank() {
        let cfg = cfg();
        let mut rng = || 0.0;
        let mut stats = NullSink;
        let mut ch = Channel::new(0, &cfg, &mut rng);
        let cmd = act(0, 0, 0, 5);
        ch.update_timing_and_state(&cmd, 0, &cfg, &mut rng, &mut stats);

        let read = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 5, 0), 0x2000);
        let ready = ch.get_ready_command(&read, cfg.t_rcd as u64, &cfg);
        assert_eq!(ready.unwrap().cmd_type, CommandType::Read);
    }

    #[test]
    fn faw_blocks_a_fifth_activate_in_window() {
        let mut cfg = cfg();
        cfg.t_faw = 20;
        cfg.t_rrd_l = 1;
        cfg.t_rrd_s = 1;
        let mut rng = || 0.0;
        let mut stats = NullSink;
        let mut ch = Channel::new(0, &cfg, &mut rng);

        for (bg, b) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            let cmd = act(0, bg, b, 2);
            ch.update_timing_and_state(&cmd, 0, &cfg, &mut rng, &mut stats);
        }

        assert!(!ch.activation_window_ok(0, 1, &cfg));
        assert!(ch.activation_window_ok(0, 21, &cfg));
    }

    #[test]
    fn rank_scope_refresh_requires_every_bank_closed() {
        let cfg = cfg();
        let mut rng = || 0.0;
        let mut stats = NullSink;
        let mut ch = Channel::new(0, &cfg, &mut rng);
        let refab = Command::new(CommandType::RefAb, Address::rank_scope(0, 0), -1);

        let ready = ch.get_ready_command(&refab, 0, &cfg);
        assert_eq!(ready.unwrap().cmd_type, CommandType::RefAb);

        let cmd = act(0, 0, 0, 5);
        ch.update_timing_and_state(&cmd, 0, &cfg, &mut rng, &mut stats);
        let ready = ch.get_ready_command(&refab, 0, &cfg);
        assert_eq!(ready.unwrap().cmd_type, CommandType::PreAb);
    }

    #[test]
    fn dream_on_activate_schedules_drfm_across_channel() {
        let mut cfg = cfg();
        cfg.dream_mode = true;
        cfg.dream_k = 2;
        cfg.dream_th = 1;
        cfg.rows = 8;
        cfg.drfm_mode = Some(DrfmMode::Bank);
        let mut rng = || 0.0;
        let mut stats = NullSink;
        let mut ch = Channel::new(0, &cfg, &mut rng);
        let cmd = act(0, 0, 0, 0);
        ch.update_timing_and_state(&cmd, 0, &cfg, &mut rng, &mut stats);
        assert!(!ch.drfm_q.is_empty());
    }
}
