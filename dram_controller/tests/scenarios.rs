//! The seven literal scenarios each mitigation/timing rule is specified
//! against, driven through the public `Channel`/`CommandQueue` API only.
//!
//! `get_ready_command` only ever takes a READ/WRITE- or refresh-family
//! command as input (ACTIVATE/PRECHARGE are outputs it derives, never
//! inputs a caller constructs); every scenario below re-queries with the
//! original request rather than feeding a derived command back in.

use dram_controller::config::{DrfmMode, RfmMode};
use dram_controller::{Address, Channel, Command, CommandQueue, CommandType, Config, NullSink};

fn single_bank_cfg() -> Config {
    Config {
        ranks: 1,
        bankgroups: 1,
        banks_per_group: 1,
        ..Config::default()
    }
}

/// Opens `row`, then forces a PRECHARGE by presenting a request to
/// `row + 1` once `tRAS` has elapsed. Advances `clk` past `tRP`.
fn activate_then_close(
    channel: &mut Channel,
    cfg: &Config,
    rng: &mut impl FnMut() -> f64,
    stats: &mut NullSink,
    clk: &mut u64,
    row: i32,
) {
    let open = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, row, 0), 0);
    let act = channel.get_ready_command(&open, *clk, cfg).unwrap();
    assert_eq!(act.cmd_type, CommandType::Activate);
    channel.update_timing_and_state(&act, *clk, cfg, rng, stats);

    *clk += cfg.t_rcd as u64 + cfg.t_ras as u64;
    let miss = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, row + 1, 0), 0);
    let pre = channel.get_ready_command(&miss, *clk, cfg).unwrap();
    assert_eq!(pre.cmd_type, CommandType::Precharge);
    channel.update_timing_and_state(&pre, *clk, cfg, rng, stats);
    *clk += cfg.t_rp as u64;
}

#[test]
fn row_hit_burst() {
    let cfg = single_bank_cfg();
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);

    let first_read = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 5, 0), 0);
    let act = channel.get_ready_command(&first_read, 0, &cfg).unwrap();
    assert_eq!(act.cmd_type, CommandType::Activate);
    channel.update_timing_and_state(&act, 0, &cfg, &mut rng, &mut stats);

    let step = cfg.t_ccd_l.max(cfg.burst_cycle) as u64;
    let first_ready = cfg.t_rcd as u64;
    for (i, col) in [0, 8, 16, 24].into_iter().enumerate() {
        let expected_clk = first_ready + i as u64 * step;
        let read = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 5, col), 0);
        if expected_clk > 0 {
            assert!(channel.get_ready_command(&read, expected_clk - 1, &cfg).is_none());
        }
        let ready = channel.get_ready_command(&read, expected_clk, &cfg).unwrap();
        assert_eq!(ready.cmd_type, CommandType::Read);
        channel.update_timing_and_state(&ready, expected_clk, &cfg, &mut rng, &mut stats);
    }
    assert_eq!(channel.bank(0, 0, 0).row_hit_count(), 4);

    // `Channel::get_ready_command` answers only "what does this one address
    // need right now" and never looks at other pending requests, so it has
    // no opinion on arbitration between a miss and row-hit traffic; that
    // scheduling decision belongs to `CommandQueue` (see
    // `precharge_arbitration_defers_for_a_pending_row_hit`, below).
    let late_read = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 5, 0), 0);
    let last_clk = first_ready + 3 * step;
    assert_eq!(channel.get_ready_command(&late_read, last_clk, &cfg).unwrap().cmd_type, CommandType::Read);
}

#[test]
fn miss_after_open() {
    let cfg = single_bank_cfg();
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);

    let open = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 5, 0), 0);
    let act = channel.get_ready_command(&open, 0, &cfg).unwrap();
    channel.update_timing_and_state(&act, 0, &cfg, &mut rng, &mut stats);

    let miss = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 6, 0), 0);
    let required = channel.get_ready_command(&miss, cfg.t_rcd as u64, &cfg).unwrap();
    assert_eq!(required.cmd_type, CommandType::Precharge);

    let pre_clk = cfg.t_ras as u64;
    let pre_issue = channel.get_ready_command(&miss, pre_clk, &cfg).unwrap();
    assert_eq!(pre_issue.cmd_type, CommandType::Precharge);
    channel.update_timing_and_state(&pre_issue, pre_clk, &cfg, &mut rng, &mut stats);

    let reopen_clk = pre_clk + cfg.t_rp as u64;
    assert!(channel.get_ready_command(&miss, reopen_clk - 1, &cfg).is_none());
    let act2 = channel.get_ready_command(&miss, reopen_clk, &cfg).unwrap();
    assert_eq!(act2.cmd_type, CommandType::Activate);
}

#[test]
fn rfm_trigger() {
    let mut cfg = single_bank_cfg();
    cfg.rfm_mode = RfmMode::SameBank;
    cfg.raaimt = 32;
    cfg.rfm_raa_decrement = 32;
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);

    let mut clk = 0u64;
    for row in 0..32 {
        activate_then_close(&mut channel, &cfg, &mut rng, &mut stats, &mut clk, row);
    }
    assert_eq!(channel.bank(0, 0, 0).raa_ctr(), 32);

    let read = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 40, 0), 0);
    let required = channel.get_ready_command(&read, clk, &cfg).unwrap();
    assert_eq!(required.cmd_type, CommandType::RfmSb);
    channel.update_timing_and_state(&required, clk, &cfg, &mut rng, &mut stats);

    let reopen_clk = clk + cfg.t_rfmsb as u64;
    assert!(channel.get_ready_command(&read, reopen_clk - 1, &cfg).is_none());
    assert_eq!(channel.get_ready_command(&read, reopen_clk, &cfg).unwrap().cmd_type, CommandType::Activate);
    assert_eq!(channel.bank(0, 0, 0).raa_ctr(), 0);
}

#[test]
fn para_activation_triggers_drfm_once_queue_fills() {
    let mut cfg = single_bank_cfg();
    cfg.para_mode = true;
    cfg.para_prob = 1.0;
    cfg.drfm_mode = Some(DrfmMode::Bank);
    cfg.drfm_qsize = 4;
    cfg.drfm_qth = 1;
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);

    let mut clk = 0u64;
    for row in 0..4 {
        activate_then_close(&mut channel, &cfg, &mut rng, &mut stats, &mut clk, row);
    }

    // The sampler is now full: a fresh request to an unopened row is
    // blocked behind the pending DRFM.
    let blocked = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 9, 0), 0);
    assert!(channel.get_ready_command(&blocked, clk, &cfg).is_none());

    let drfm = channel.next_pending_command(clk, &cfg).unwrap();
    assert_eq!(drfm.cmd_type, CommandType::DrfmB);
    channel.update_timing_and_state(&drfm, clk, &cfg, &mut rng, &mut stats);
    clk += cfg.t_drfmb as u64;

    assert_eq!(channel.get_ready_command(&blocked, clk, &cfg).unwrap().cmd_type, CommandType::Activate);
}

#[test]
fn graphene_tracking_inserts_drfm_on_fourth_activate() {
    let mut cfg = single_bank_cfg();
    cfg.graphene_mode = true;
    cfg.graphene_th = 4;
    cfg.graphene_table_size = 2;
    cfg.drfm_mode = Some(DrfmMode::Bank);
    cfg.drfm_qsize = 4;
    cfg.drfm_qth = 1;
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);

    let mut clk = 0u64;
    for row in [0, 0, 0, 0, 1, 1, 1, 2] {
        activate_then_close(&mut channel, &cfg, &mut rng, &mut stats, &mut clk, row);
    }

    let drfm = channel.next_pending_command(clk, &cfg).unwrap();
    assert_eq!(drfm.cmd_type, CommandType::DrfmB);
    assert_eq!(drfm.addr.row, 0);
}

#[test]
fn hydra_two_level_filter_escalates_to_drfm() {
    let mut cfg = single_bank_cfg();
    cfg.hydra_mode = true;
    cfg.hydra_gct_size = 4;
    cfg.hydra_gct_th = 2;
    cfg.hydra_th = 4;
    cfg.hydra_rcc_sets = 4;
    cfg.hydra_rcc_ways = 2;
    cfg.hydra_wbq_size = 8;
    cfg.drfm_mode = Some(DrfmMode::Bank);
    cfg.drfm_qsize = 4;
    cfg.drfm_qth = 1;
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);

    let mut clk = 0u64;
    // Four activations to the same row: the third crosses gct_th and seeds
    // per-row counters at 2, the fourth pushes the row past hydra_th.
    for _ in 0..4 {
        let open = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 10, 0), 0);
        let mut activated = false;
        for _ in 0..8 {
            match channel.get_ready_command(&open, clk, &cfg) {
                Some(issued) if issued.cmd_type == CommandType::Activate => {
                    channel.update_timing_and_state(&issued, clk, &cfg, &mut rng, &mut stats);
                    activated = true;
                    break;
                }
                _ => {
                    if let Some(hydra_cmd) = channel.next_hydra_command(&cfg) {
                        channel.update_timing_and_state(&hydra_cmd, clk, &cfg, &mut rng, &mut stats);
                        channel.pop_hydra_command();
                    }
                    clk += 1;
                }
            }
        }
        assert!(activated, "hydra RCC gate never released the ACTIVATE");
        clk += cfg.t_rcd as u64 + cfg.t_ras as u64;
        let miss = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 11, 0), 0);
        let pre = channel.get_ready_command(&miss, clk, &cfg).unwrap();
        assert_eq!(pre.cmd_type, CommandType::Precharge);
        channel.update_timing_and_state(&pre, clk, &cfg, &mut rng, &mut stats);
        clk += cfg.t_rp as u64;
    }

    assert!(channel.next_pending_command(clk, &cfg).is_some());
}

#[test]
fn faw_blocks_a_fifth_activate_in_window() {
    // Five distinct banks: the first four absorb the window, the fifth
    // stays untouched so only the FAW gate (never bank row state) can be
    // what blocks its ACTIVATE.
    let mut cfg = Config {
        ranks: 1,
        bankgroups: 5,
        banks_per_group: 1,
        ..Config::default()
    };
    cfg.t_faw = 20;
    cfg.t_rrd_l = 1;
    cfg.t_rrd_s = 1;
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);

    for (c, bg) in (0u64..4).zip(0..4) {
        let open = Command::new(CommandType::Read, Address::new(0, 0, bg, 0, 2, 0), 0);
        let act = channel.get_ready_command(&open, c, &cfg).unwrap();
        assert_eq!(act.cmd_type, CommandType::Activate);
        channel.update_timing_and_state(&act, c, &cfg, &mut rng, &mut stats);
    }

    let fifth = Command::new(CommandType::Read, Address::new(0, 0, 4, 0, 9, 0), 0);
    assert!(channel.get_ready_command(&fifth, 4, &cfg).is_none());
    assert_eq!(channel.get_ready_command(&fifth, cfg.t_faw as u64, &cfg).unwrap().cmd_type, CommandType::Activate);
}

#[test]
fn command_queue_round_robins_and_issues_through_the_channel() {
    let cfg = Config {
        ranks: 1,
        bankgroups: 1,
        banks_per_group: 2,
        cmd_queue_size: 4,
        ..Config::default()
    };
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);
    let mut queue = CommandQueue::new(&cfg);

    queue.add_command(Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 3, 0), 0x10));
    queue.add_command(Command::new(CommandType::Read, Address::new(0, 0, 0, 1, 4, 0), 0x20));

    let issued = queue.get_command_to_issue(&mut channel, 0, &cfg, &mut stats).unwrap();
    assert_eq!(issued.cmd_type, CommandType::Activate);
    channel.update_timing_and_state(&issued, 0, &cfg, &mut rng, &mut stats);
}

#[test]
fn precharge_arbitration_defers_for_a_pending_row_hit() {
    let cfg = single_bank_cfg();
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);
    let mut queue = CommandQueue::new(&cfg);

    let open = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 5, 0), 0);
    let act = channel.get_ready_command(&open, 0, &cfg).unwrap();
    channel.update_timing_and_state(&act, 0, &cfg, &mut rng, &mut stats);
    let clk = cfg.t_rcd as u64 + cfg.t_ras as u64;

    // A miss to row 6 is queued ahead of a pending hit to the still-open
    // row 5; the miss's PRECHARGE must defer so the hit issues first.
    queue.add_command(Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 6, 0), 0x1));
    queue.add_command(Command::new(CommandType::Read, Address::new(0, 0, 0, 0, 5, 1), 0x2));

    let issued = queue.get_command_to_issue(&mut channel, clk, &cfg, &mut stats).unwrap();
    assert_eq!(issued.cmd_type, CommandType::Read);
    assert_eq!(issued.addr.row, 5);
}
