//! ACT-storm micro-benchmark: closes and reopens one bank repeatedly until
//! its RAA counter crosses threshold and the channel starts interleaving
//! RFM traffic ahead of ordinary reads, measuring the combined cost of the
//! mitigation gate and the maintenance-command path.

use criterion::{Criterion, criterion_group, criterion_main};

use dram_controller::config::RfmMode;
use dram_controller::{Address, Channel, Command, CommandType, Config, NullSink};

fn cfg() -> Config {
    Config {
        ranks: 1,
        bankgroups: 1,
        banks_per_group: 1,
        rfm_mode: RfmMode::SameBank,
        raaimt: 4,
        raammt: 8,
        ..Config::default()
    }
}

fn bench_act_storm_with_rfm(c: &mut Criterion) {
    let cfg = cfg();
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);
    let mut clk = 0u64;
    let mut row = 0i32;

    c.bench_function("act_storm_with_rfm", |b| {
        b.iter(|| {
            row = (row + 1) % 1024;
            let read = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, row, 0), 0);
            match channel.get_ready_command(&read, clk, &cfg) {
                Some(issued) if issued.cmd_type == CommandType::RfmSb => {
                    channel.update_timing_and_state(&issued, clk, &cfg, &mut rng, &mut stats);
                    clk += cfg.t_rfc as u64;
                }
                Some(issued) => {
                    channel.update_timing_and_state(&issued, clk, &cfg, &mut rng, &mut stats);
                    clk += cfg.t_rcd as u64;
                    let read2 = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, row, 0), 0);
                    if let Some(issued2) = channel.get_ready_command(&read2, clk, &cfg) {
                        channel.update_timing_and_state(&issued2, clk, &cfg, &mut rng, &mut stats);
                    }
                    clk += cfg.burst_cycle as u64;
                    let miss = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, row + 1, 0), 0);
                    if let Some(issued3) = channel.get_ready_command(&miss, clk, &cfg) {
                        channel.update_timing_and_state(&issued3, clk, &cfg, &mut rng, &mut stats);
                    }
                    clk += cfg.t_rp as u64;
                }
                None => clk += 1,
            }
        });
    });
}

criterion_group!(benches, bench_act_storm_with_rfm);
criterion_main!(benches);
