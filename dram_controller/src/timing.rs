//! Derived command-to-command delay table.
//!
//! Built once from a validated [`Config`] and never mutated afterward. For
//! every command type issued at cycle `clk`, the table gives a list of
//! `(blocked_command, delay)` pairs that get stamped forward into a bank's
//! or channel's `cmd_timing[blocked_command] = max(existing, clk + delay)`.
//! Grouped by scope, mirroring the same seven scopes `ChannelState` stamps
//! timing into: the same bank, other banks in the same bankgroup, other
//! bankgroups in the same rank, other ranks, the whole same rank, the same
//! bankset (same bank index across bankgroups), and other banksets.

use crate::command::CommandType;
use crate::config::Config;

/// Which bank/rank/bankset relationship a delay entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    SameBank,
    OtherBanksSameBankgroup,
    OtherBankgroupsSameRank,
    OtherRanks,
    SameRank,
    SameBankset,
    OtherBanksets,
}

const SCOPE_COUNT: usize = 7;

#[derive(Debug, Clone, Default)]
struct Row {
    entries: [Vec<(CommandType, u32)>; SCOPE_COUNT],
}

impl Row {
    fn push(&mut self, scope: Scope, to: CommandType, delay: u32) {
        self.entries[scope as usize].push((to, delay));
    }

    fn get(&self, scope: Scope) -> &[(CommandType, u32)] {
        &self.entries[scope as usize]
    }
}

/// The complete (from-command, scope) -> [(to-command, delay)] table.
#[derive(Debug, Clone)]
pub struct Timing {
    rows: Vec<Row>,
}

impl Timing {
    /// Construct the full delay table from a validated configuration. This
    /// is the only place in the crate that performs this derivation; every
    /// bank and channel shares one `Timing` built at startup.
    pub fn new(cfg: &Config) -> Self {
        let mut rows = vec![Row::default(); CommandType::COUNT];
        let row = |rows: &mut Vec<Row>, cmd: CommandType| &mut rows[cmd as usize];

        let rl = cfg.al + cfg.t_rcdrd;
        let wl = cfg.al + cfg.wl;
        let read_to_write = rl + cfg.burst_cycle + cfg.t_rtrs - wl;
        let read_to_write_o = read_to_write;
        let write_to_read_l = wl + cfg.burst_cycle + cfg.t_wtr_l;
        let write_to_read_s = wl + cfg.burst_cycle + cfg.t_wtr_s;
        let write_to_read_o = wl + cfg.burst_cycle + cfg.t_rtrs;
        let write_to_write_l = cfg.t_ccd_l;
        let write_to_write_s = cfg.t_ccd_s;
        let write_to_write_o = cfg.burst_cycle;
        let write_to_precharge = wl + cfg.burst_cycle + cfg.t_wr;
        let read_to_precharge = cfg.t_rtp;
        let read_to_activate = cfg.t_rtp + cfg.t_rp;
        let write_to_activate = write_to_precharge + cfg.t_rp;

        // READ
        {
            let r = row(&mut rows, CommandType::Read);
            r.push(Scope::SameBank, CommandType::Precharge, read_to_precharge);
            r.push(Scope::SameBank, CommandType::ReadPrecharge, read_to_precharge);
            r.push(Scope::SameBank, CommandType::Read, cfg.t_ccd_l);
            r.push(Scope::SameBank, CommandType::Write, read_to_write);
            r.push(Scope::OtherBanksSameBankgroup, CommandType::Read, cfg.t_ccd_l);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::Read, cfg.t_ccd_s);
            r.push(Scope::OtherRanks, CommandType::Read, cfg.burst_cycle + cfg.t_rtrs);
            r.push(Scope::OtherRanks, CommandType::Write, read_to_write_o);
            r.push(Scope::SameRank, CommandType::Write, read_to_write_o);
        }

        // WRITE
        {
            let r = row(&mut rows, CommandType::Write);
            r.push(Scope::SameBank, CommandType::Precharge, write_to_precharge);
            r.push(Scope::SameBank, CommandType::WritePrecharge, write_to_precharge);
            r.push(Scope::SameBank, CommandType::Read, write_to_read_l);
            r.push(Scope::SameBank, CommandType::Write, write_to_write_l);
            r.push(Scope::OtherBanksSameBankgroup, CommandType::Write, write_to_write_l);
            r.push(Scope::OtherBanksSameBankgroup, CommandType::Read, write_to_read_l);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::Write, write_to_write_s);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::Read, write_to_read_s);
            r.push(Scope::OtherRanks, CommandType::Write, write_to_write_o);
            r.push(Scope::OtherRanks, CommandType::Read, write_to_read_o);
            r.push(Scope::SameRank, CommandType::Write, write_to_write_o);
            r.push(Scope::SameRank, CommandType::Read, write_to_read_o);
        }

        // READ_PRECHARGE
        {
            let r = row(&mut rows, CommandType::ReadPrecharge);
            r.push(Scope::SameBank, CommandType::Activate, read_to_activate);
            r.push(Scope::SameBank, CommandType::RefreshBank, read_to_activate);
            r.push(Scope::SameBank, CommandType::RefSb, read_to_activate);
            r.push(Scope::SameBank, CommandType::RefAb, read_to_activate);
            r.push(Scope::SameBank, CommandType::RfmSb, read_to_activate);
            r.push(Scope::SameBank, CommandType::RfmAb, read_to_activate);
            r.push(Scope::SameBank, CommandType::DrfmB, read_to_activate);
            r.push(Scope::SameBank, CommandType::DrfmSb, read_to_activate);
            r.push(Scope::SameBank, CommandType::DrfmAb, read_to_activate);
            r.push(Scope::SameBank, CommandType::SrefEnter, read_to_activate);
            r.push(Scope::OtherBanksSameBankgroup, CommandType::Read, cfg.t_ccd_l);
            r.push(Scope::OtherBanksSameBankgroup, CommandType::Write, read_to_write);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::Read, cfg.t_ccd_s);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::Write, read_to_write);
            r.push(Scope::OtherRanks, CommandType::Read, cfg.burst_cycle + cfg.t_rtrs);
            r.push(Scope::OtherRanks, CommandType::Write, read_to_write_o);
        }

        // WRITE_PRECHARGE
        {
            let r = row(&mut rows, CommandType::WritePrecharge);
            r.push(Scope::SameBank, CommandType::Activate, write_to_activate);
            r.push(Scope::SameBank, CommandType::RefreshBank, write_to_activate);
            r.push(Scope::SameBank, CommandType::RefSb, write_to_activate);
            r.push(Scope::SameBank, CommandType::RefAb, write_to_activate);
            r.push(Scope::SameBank, CommandType::RfmSb, write_to_activate);
            r.push(Scope::SameBank, CommandType::RfmAb, write_to_activate);
            r.push(Scope::SameBank, CommandType::DrfmB, write_to_activate);
            r.push(Scope::SameBank, CommandType::DrfmSb, write_to_activate);
            r.push(Scope::SameBank, CommandType::DrfmAb, write_to_activate);
            r.push(Scope::SameBank, CommandType::SrefEnter, write_to_activate);
            r.push(Scope::OtherBanksSameBankgroup, CommandType::Write, write_to_write_l);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::Write, write_to_write_s);
            r.push(Scope::OtherRanks, CommandType::Write, write_to_write_o);
        }

        // ACTIVATE
        {
            let r = row(&mut rows, CommandType::Activate);
            r.push(Scope::SameBank, CommandType::Activate, cfg.t_rc);
            r.push(Scope::SameBank, CommandType::Read, cfg.t_rcd);
            r.push(Scope::SameBank, CommandType::Write, cfg.t_rcd);
            r.push(Scope::SameBank, CommandType::Precharge, cfg.t_ras);
            r.push(Scope::OtherBanksSameBankgroup, CommandType::Activate, cfg.t_rrd_l);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::Activate, cfg.t_rrd_s);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::RefreshBank, cfg.t_rrd_s);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::RefSb, cfg.t_rrd_s);
        }

        // PRECHARGE / PREab / PREsb share the same same-bank activate/refresh
        // fan-out; GDDR/LPDDR4/DDR5 additionally space precharges with tPPD.
        for precharge_cmd in [CommandType::Precharge, CommandType::PreAb, CommandType::PreSb] {
            let r = row(&mut rows, precharge_cmd);
            r.push(Scope::SameBank, CommandType::Activate, cfg.t_rp);
            r.push(Scope::SameBank, CommandType::RefreshBank, cfg.t_rp);
            r.push(Scope::SameBank, CommandType::RefSb, cfg.t_rp);
            r.push(Scope::SameBank, CommandType::RefAb, cfg.t_rp);
            r.push(Scope::SameBank, CommandType::RfmSb, cfg.t_rp);
            r.push(Scope::SameBank, CommandType::RfmAb, cfg.t_rp);
            r.push(Scope::SameBank, CommandType::DrfmB, cfg.t_rp);
            r.push(Scope::SameBank, CommandType::DrfmSb, cfg.t_rp);
            r.push(Scope::SameBank, CommandType::DrfmAb, cfg.t_rp);
            r.push(Scope::SameBank, CommandType::SrefEnter, cfg.t_rp);
            r.push(Scope::SameBank, CommandType::Precharge, cfg.t_rp);
            if cfg.protocol.needs_tppd() {
                r.push(Scope::OtherBanksSameBankgroup, CommandType::Precharge, cfg.t_ppd);
                r.push(Scope::OtherBankgroupsSameRank, CommandType::Precharge, cfg.t_ppd);
            }
        }

        // REFRESH_BANK
        {
            let r = row(&mut rows, CommandType::RefreshBank);
            r.push(Scope::SameRank, CommandType::Activate, cfg.t_rfcb);
            r.push(Scope::OtherBanksSameBankgroup, CommandType::Activate, cfg.t_rrd_l);
            r.push(Scope::OtherBanksSameBankgroup, CommandType::RefreshBank, cfg.t_rrd_l);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::Activate, cfg.t_rrd_s);
            r.push(Scope::OtherBankgroupsSameRank, CommandType::RefreshBank, cfg.t_rrd_s);
        }

        // DRFMb
        {
            let r = row(&mut rows, CommandType::DrfmB);
            r.push(Scope::SameBank, CommandType::Activate, cfg.t_drfmb);
        }

        // REFab, and everything sharing its same-rank refresh-recovery fan-out.
        {
            let r = row(&mut rows, CommandType::RefAb);
            for blocked in [
                CommandType::Activate,
                CommandType::RefAb,
                CommandType::RefSb,
                CommandType::SrefEnter,
                CommandType::RfmAb,
                CommandType::RfmSb,
                CommandType::DrfmAb,
                CommandType::DrfmSb,
                CommandType::DrfmB,
            ] {
                r.push(Scope::SameRank, blocked, cfg.t_rfc);
            }
        }

        // SREF_ENTER / SREF_EXIT
        {
            let r = row(&mut rows, CommandType::SrefEnter);
            r.push(Scope::SameRank, CommandType::SrefExit, cfg.t_ckesr);
        }
        {
            let r = row(&mut rows, CommandType::SrefExit);
            r.push(Scope::SameRank, CommandType::Activate, cfg.t_xs);
        }

        // RFMab
        {
            let r = row(&mut rows, CommandType::RfmAb);
            r.push(Scope::SameRank, CommandType::Activate, cfg.t_rfm);
        }

        // DRFMab
        {
            let r = row(&mut rows, CommandType::DrfmAb);
            r.push(Scope::SameRank, CommandType::Activate, cfg.t_drfmab);
        }

        // RFMsb
        {
            let r = row(&mut rows, CommandType::RfmSb);
            r.push(Scope::SameBankset, CommandType::Activate, cfg.t_rfmsb);
        }

        // DRFMsb
        {
            let r = row(&mut rows, CommandType::DrfmSb);
            r.push(Scope::SameBankset, CommandType::Activate, cfg.t_drfmsb);
        }

        // REFsb
        {
            let r = row(&mut rows, CommandType::RefSb);
            r.push(Scope::SameBankset, CommandType::Activate, cfg.t_rfcsb);
            r.push(Scope::OtherBanksets, CommandType::Activate, cfg.t_rrd_s);
        }

        Self { rows }
    }

    /// Delay entries blocked in `scope` by issuing `from`.
    pub fn delays(&self, from: CommandType, scope: Scope) -> &[(CommandType, u32)] {
        self.rows[from as usize].get(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn read_same_bank_precharge_delay_matches_trtp() {
        let cfg = Config::default();
        let timing = Timing::new(&cfg);
        let delays = timing.delays(CommandType::Read, Scope::SameBank);
        let (_, delay) = delays
            .iter()
            .find(|(cmd, _)| *cmd == CommandType::Precharge)
            .expect("read->precharge entry");
        assert_eq!(*delay, cfg.t_rtp);
    }

    #[test]
    fn activate_same_bank_to_activate_is_trc() {
        let cfg = Config::default();
        let timing = Timing::new(&cfg);
        let delays = timing.delays(CommandType::Activate, Scope::SameBank);
        let (_, delay) = delays
            .iter()
            .find(|(cmd, _)| *cmd == CommandType::Activate)
            .unwrap();
        assert_eq!(*delay, cfg.t_rc);
    }

    #[test]
    fn precharge_gets_tppd_entries_only_when_protocol_needs_it() {
        let mut cfg = Config {
            protocol: crate::config::Protocol::Ddr4,
            ..Config::default()
        };
        let timing = Timing::new(&cfg);
        assert!(timing
            .delays(CommandType::Precharge, Scope::OtherBanksSameBankgroup)
            .is_empty());

        cfg.protocol = crate::config::Protocol::Gddr6;
        let timing = Timing::new(&cfg);
        assert!(!timing
            .delays(CommandType::Precharge, Scope::OtherBanksSameBankgroup)
            .is_empty());
    }

    #[test]
    fn refsb_blocks_activate_in_other_banksets_too() {
        let cfg = Config::default();
        let timing = Timing::new(&cfg);
        assert!(!timing.delays(CommandType::RefSb, Scope::SameBankset).is_empty());
        assert!(!timing.delays(CommandType::RefSb, Scope::OtherBanksets).is_empty());
    }
}
