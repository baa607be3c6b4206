//! # DRAM Controller
//!
//! Cycle-accurate per-channel DRAM controller simulator with a pluggable
//! family of RowHammer mitigation engines (PARA, Graphene, Hydra, MINT,
//! DREAM, ABACUS, MOAT, PRAC).
//!
//! ## Architecture
//!
//! 1. **Bank** — per-bank row-buffer state machine, per-bank command-ready
//!    test, per-bank mitigation tracking.
//! 2. **Channel** — aggregates banks, arbitrates refresh/RFM/DRFM/Hydra
//!    traffic, drives the channel-wide mitigators (DREAM, ABACUS), handles
//!    the ABO alert flow.
//! 3. **CommandQueue** — per-bank or per-rank queues, round-robin
//!    scheduling, precharge arbitration, write-after-read hazard avoidance.
//! 4. **Timing** — immutable, configuration-derived (command × scope) →
//!    delay table built once at construction.
//!
//! ## Allocation Discipline
//!
//! Small, tightly-bounded per-bank queues (the DRFM sampling queue, MINT's
//! row window, Graphene's tracking table) use `heapless` collections capped
//! at a crate-wide maximum, so their capacity is a compile-time constant
//! that a configuration only sizes within. Per-row tracking tables (PRAC
//! counters, Hydra's GCT/RCC tables) are genuinely sized from `Config::rows`
//! and `Config::hydra_gct_size`, so those allocate once at `Bank`/`Channel`
//! construction; nothing allocates again afterward in the steady-state
//! `update_state`/`get_ready_command`/`update_timing` cycle.
//!
//! The surrounding harness — CLI, trace ingestion, statistics serialization,
//! multi-channel fan-out — is an external collaborator and out of scope for
//! this crate.

pub mod bank;
pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod queue;
pub mod stats;
pub mod timing;

pub use bank::Bank;
pub use channel::Channel;
pub use command::{Address, Command, CommandType};
pub use config::Config;
pub use queue::CommandQueue;
pub use stats::{Counter, NullSink, StatsSink};
pub use timing::Timing;
