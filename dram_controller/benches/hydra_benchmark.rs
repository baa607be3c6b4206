//! Hydra-enabled access pattern: cycles through enough distinct rows to
//! force RCC hits, misses, and LRU evictions, measuring the combined cost
//! of the GCT lookup, RCC probe, and synthesized read/writeback traffic.

use criterion::{Criterion, criterion_group, criterion_main};

use dram_controller::{Address, Channel, Command, CommandType, Config, NullSink};

fn cfg() -> Config {
    Config {
        ranks: 1,
        bankgroups: 1,
        banks_per_group: 1,
        hydra_mode: true,
        hydra_gct_size: 8,
        hydra_gct_th: 2,
        hydra_rcc_sets: 4,
        hydra_rcc_ways: 2,
        hydra_wbq_size: 4,
        ..Config::default()
    }
}

fn drain_hydra_traffic(channel: &mut Channel, cfg: &Config, clk: &mut u64, rng: &mut impl FnMut() -> f64, stats: &mut NullSink) {
    while let Some(cmd) = channel.next_hydra_command(cfg) {
        channel.update_timing_and_state(&cmd, *clk, cfg, rng, stats);
        channel.pop_hydra_command();
        *clk += cfg.t_ccd_l as u64;
    }
}

fn bench_hydra_rcc_churn(c: &mut Criterion) {
    let cfg = cfg();
    let mut rng = || 0.0;
    let mut stats = NullSink;
    let mut channel = Channel::new(0, &cfg, &mut rng);
    let mut clk = 0u64;
    let mut row = 0i32;

    c.bench_function("hydra_rcc_churn", |b| {
        b.iter(|| {
            row = (row + 1) % 64;
            let open = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, row, 0), 0);
            if let Some(issued) = channel.get_ready_command(&open, clk, &cfg) {
                channel.update_timing_and_state(&issued, clk, &cfg, &mut rng, &mut stats);
                clk += cfg.t_rcd as u64;
            } else {
                drain_hydra_traffic(&mut channel, &cfg, &mut clk, &mut rng, &mut stats);
            }

            let miss = Command::new(CommandType::Read, Address::new(0, 0, 0, 0, row + 1, 0), 0);
            if let Some(issued) = channel.get_ready_command(&miss, clk, &cfg) {
                channel.update_timing_and_state(&issued, clk, &cfg, &mut rng, &mut stats);
            }
            clk += cfg.t_rp as u64;
        });
    });
}

criterion_group!(benches, bench_hydra_rcc_churn);
criterion_main!(benches);
