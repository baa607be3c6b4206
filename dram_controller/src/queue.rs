//! Command-issuing queue sitting in front of a [`crate::channel::Channel`].
//! Holds pending requests per bank or per rank depending on
//! [`crate::config::QueueStructure`], round-robins across its sub-queues,
//! and scans each sub-queue for the first entry the channel will accept —
//! skipping a write that would bypass an earlier pending read to the exact
//! same address, and deferring a PRECHARGE candidate in favor of other
//! pending traffic to the same bank.

use crate::channel::Channel;
use crate::command::{Address, Command, CommandType};
use crate::config::{Config, QueueStructure};
use crate::stats::{Counter, StatsSink};

/// Per-bank or per-rank FIFOs of not-yet-issued commands, arbitrated
/// round-robin.
pub struct CommandQueue {
    structure: QueueStructure,
    bankgroups: u32,
    banks_per_group: u32,
    capacity: usize,
    queues: Vec<Vec<Command>>,
    rr_idx: usize,
}

impl CommandQueue {
    pub fn new(cfg: &Config) -> Self {
        let count = match cfg.queue_structure {
            QueueStructure::PerBank => cfg.ranks * cfg.bankgroups * cfg.banks_per_group,
            QueueStructure::PerRank => cfg.ranks,
        };
        Self {
            structure: cfg.queue_structure,
            bankgroups: cfg.bankgroups,
            banks_per_group: cfg.banks_per_group,
            capacity: cfg.cmd_queue_size as usize,
            queues: vec![Vec::new(); count.max(1) as usize],
            rr_idx: 0,
        }
    }

    fn queue_index(&self, addr: &Address) -> usize {
        match self.structure {
            QueueStructure::PerBank => {
                (addr.rank as u32 * self.bankgroups * self.banks_per_group
                    + addr.bankgroup as u32 * self.banks_per_group
                    + addr.bank as u32) as usize
            }
            QueueStructure::PerRank => addr.rank as usize,
        }
    }

    /// Whether the target sub-queue has room for one more command.
    pub fn is_full(&self, addr: &Address) -> bool {
        self.queues[self.queue_index(addr)].len() >= self.capacity
    }

    /// Current depth of the sub-queue that would hold `addr`, for a harness
    /// making its own backpressure decisions.
    pub fn queue_usage(&self, addr: &Address) -> usize {
        self.queues[self.queue_index(addr)].len()
    }

    /// Whether `add_command` would currently accept `cmd` without dropping
    /// it, i.e. its target sub-queue isn't already full.
    pub fn will_accept_command(&self, cmd: &Command) -> bool {
        !self.is_full(&cmd.addr)
    }

    /// Enqueue a request. Returns `false` (and does nothing) if the target
    /// sub-queue is already at `cmd_queue_size`.
    pub fn add_command(&mut self, cmd: Command) -> bool {
        let idx = self.queue_index(&cmd.addr);
        if self.queues[idx].len() >= self.capacity {
            return false;
        }
        self.queues[idx].push(cmd);
        true
    }

    /// Drop a pending read/write for `addr` without issuing it (used when a
    /// transaction is cancelled upstream). No-op if nothing matches.
    pub fn erase_rw_command(&mut self, addr: &Address) {
        let idx = self.queue_index(addr);
        if let Some(pos) = self.queues[idx].iter().position(|c| c.is_read_write() && c.addr == *addr) {
            self.queues[idx].remove(pos);
        }
    }

    fn first_ready_in(&self, sub: &[Command], channel: &mut Channel, clk: u64, cfg: &Config, stats: &mut impl StatsSink) -> Option<usize> {
        for (i, cmd) in sub.iter().enumerate() {
            if cmd.cmd_type.is_write() {
                let blocked_by_read = sub[..i].iter().any(|earlier| earlier.cmd_type.is_read() && earlier.addr == cmd.addr);
                if blocked_by_read {
                    continue;
                }
            }
            let Some(required) = channel.get_ready_command(cmd, clk, cfg) else {
                continue;
            };
            // `required` is a synthesized PRECHARGE only when it differs from
            // `cmd`'s own type; ReadPrecharge/WritePrecharge returned as-is
            // (a row hit serviced with its own auto-precharge) are not an
            // arbitration candidate, just the requested command being ready.
            if required.cmd_type != cmd.cmd_type && required.cmd_type.is_precharge() {
                if Self::defer_precharge(sub, i, cmd, channel) {
                    continue;
                }
                stats.increment(Counter::OndemandPrecharges);
            }
            return Some(i);
        }
        None
    }

    /// Whether a PRECHARGE candidate at `sub[i]` should be deferred in favor
    /// of other pending traffic to the same bank: an earlier-queued request
    /// to that bank takes priority, and so does a pending request to that
    /// bank's currently-open row while `row_hit_count` hasn't yet saturated.
    fn defer_precharge(sub: &[Command], i: usize, cmd: &Command, channel: &Channel) -> bool {
        let same_bank = |other: &Command| {
            other.addr.rank == cmd.addr.rank && other.addr.bankgroup == cmd.addr.bankgroup && other.addr.bank == cmd.addr.bank
        };
        if sub[..i].iter().any(|earlier| same_bank(earlier)) {
            return true;
        }
        let bank = channel.bank(cmd.addr.rank, cmd.addr.bankgroup, cmd.addr.bank);
        if bank.row_hit_count() >= 4 {
            return false;
        }
        sub.iter().enumerate().any(|(j, other)| j != i && same_bank(other) && other.addr.row == bank.open_row())
    }

    /// The next command the channel will accept, scanning sub-queues
    /// round-robin and preferring any Hydra-synthesized RCC traffic
    /// ahead of ordinary requests. Pops the originating entry from its
    /// sub-queue only once the actual requested command (not an
    /// intermediate PRECHARGE/ACTIVATE) is what gets issued.
    pub fn get_command_to_issue(&mut self, channel: &mut Channel, clk: u64, cfg: &Config, stats: &mut impl StatsSink) -> Option<Command> {
        if let Some(hydra_cmd) = channel.next_hydra_command(cfg) {
            channel.pop_hydra_command();
            return Some(hydra_cmd);
        }
        if let Some(pending) = channel.next_pending_command(clk, cfg) {
            return channel.get_ready_command(&pending, clk, cfg);
        }

        let n = self.queues.len();
        for offset in 0..n {
            let qi = (self.rr_idx + offset) % n;
            let Some(local_idx) = self.first_ready_in(&self.queues[qi], channel, clk, cfg, stats) else {
                continue;
            };
            let entry = self.queues[qi][local_idx];
            let issued = channel.get_ready_command(&entry, clk, cfg)?;
            if issued.cmd_type == entry.cmd_type {
                self.queues[qi].remove(local_idx);
            }
            self.rr_idx = (qi + 1) % n;
            return Some(issued);
        }
        None
    }
}

/// Diagnostic dump of per-sub-queue depth and head command, for a harness
/// to print when nothing has issued for an unreasonably long span.
impl std::fmt::Display for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "CommandQueue ({:?}, rr_idx={}):", self.structure, self.rr_idx)?;
        for (i, sub) in self.queues.iter().enumerate() {
            match sub.first() {
                Some(head) => writeln!(f, "  queue[{i}] depth={}/{} head={:?}@{:?}", sub.len(), self.capacity, head.cmd_type, head.addr)?,
                None => writeln!(f, "  queue[{i}] depth=0/{}", self.capacity)?,
            }
        }
        Ok(())
    }
}
