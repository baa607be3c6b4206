//! Hydra's channel-wide row-copy cache and synthesized read/write dedup
//! queues.
//!
//! A bank's GCT overflow (see [`crate::bank::mitigation::Mitigator::Hydra`])
//! hands off to this set-associative LRU: a lookup miss means the row's
//! count needs fetching into the cache (synthesize a READ), a hit that
//! evicts a dirty line means the evicted row must be written back
//! (synthesize a READ for the new row and a WRITE for the evicted one).
//! Both synthesized commands are deduplicated against what's already
//! in-flight before being queued, mirroring `HydraRead`/`HydraWB`.

use crate::command::{Address, Command, CommandType};

#[derive(Debug, Clone, Copy)]
struct Line {
    tag: u64,
    valid: bool,
}

/// Outcome of an RCC probe: `Hit` needs nothing further, `Miss` needs a
/// fetch, `Evict` needs a fetch plus a writeback of the evicted tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RccOutcome {
    Hit,
    Miss,
    Evict { evicted_tag: u64 },
}

#[derive(Debug, Clone)]
pub struct HydraRcc {
    ways: usize,
    sets: Vec<Vec<Line>>,
    /// Per-set LRU order, most-recently-used at the back.
    lru: Vec<Vec<usize>>,
}

impl HydraRcc {
    pub fn new(num_sets: u32, ways: u32) -> Self {
        let ways = ways.max(1) as usize;
        let num_sets = num_sets.max(1) as usize;
        Self {
            ways,
            sets: vec![vec![Line { tag: 0, valid: false }; ways]; num_sets],
            lru: (0..num_sets).map(|_| (0..ways).collect()).collect(),
        }
    }

    fn set_idx(&self, set: u64) -> usize {
        (set as usize) % self.sets.len()
    }

    pub fn probe(&mut self, tag: u64, set: u64) -> RccOutcome {
        let set_idx = self.set_idx(set);
        let lines = &mut self.sets[set_idx];

        if let Some(way) = lines.iter().position(|l| l.valid && l.tag == tag) {
            let order = &mut self.lru[set_idx];
            order.retain(|&w| w != way);
            order.push(way);
            return RccOutcome::Hit;
        }

        let victim_way = self.lru[set_idx][0];
        let evicted = lines[victim_way];
        lines[victim_way] = Line { tag, valid: true };
        let order = &mut self.lru[set_idx];
        order.remove(0);
        order.push(victim_way);

        if evicted.valid {
            RccOutcome::Evict {
                evicted_tag: evicted.tag,
            }
        } else {
            RccOutcome::Miss
        }
    }
}

/// The channel-wide synthesized read/write queues plus write-back draining
/// toggle.
#[derive(Debug, Clone, Default)]
pub struct HydraQueues {
    rd_q: Vec<Command>,
    wb_q: Vec<Command>,
    draining_wb: bool,
}

impl HydraQueues {
    fn addr_matches(addr: &Address, rank: i32, bankgroup: i32, bank: i32, row: i32) -> bool {
        addr.rank == rank && addr.bankgroup == bankgroup && addr.bank == bank && addr.row == row
    }

    /// Queue a synthesized read unless one's already in flight (in either
    /// queue). Returns `true` if the access is already in flight (the
    /// caller's ACTIVATE can proceed once this returns `true` for every
    /// address it touched).
    pub fn hydra_read(&mut self, channel: i32, rank: i32, bankgroup: i32, bank: i32, row: i32) -> bool {
        if self
            .wb_q
            .iter()
            .any(|c| Self::addr_matches(&c.addr, rank, bankgroup, bank, row))
        {
            return true;
        }
        if self
            .rd_q
            .iter()
            .any(|c| Self::addr_matches(&c.addr, rank, bankgroup, bank, row))
        {
            return false;
        }
        let addr = Address::new(channel, rank, bankgroup, bank, row, -1);
        self.rd_q.push(Command::new(CommandType::Read, addr, -1));
        false
    }

    pub fn hydra_wb(&mut self, channel: i32, rank: i32, bankgroup: i32, bank: i32, row: i32) {
        if self
            .wb_q
            .iter()
            .any(|c| Self::addr_matches(&c.addr, rank, bankgroup, bank, row))
        {
            return;
        }
        let addr = Address::new(channel, rank, bankgroup, bank, row, -1);
        self.wb_q.push(Command::new(CommandType::Write, addr, -1));
    }

    pub fn is_draining(&self) -> bool {
        self.draining_wb
    }

    pub fn is_blocking(&self) -> bool {
        self.draining_wb || !self.rd_q.is_empty()
    }

    /// Picks the front of whichever queue is currently being drained
    /// (write-back queue once it's full and the read queue has drained, the
    /// read queue otherwise), without removing it.
    pub fn front(&mut self, wbq_size: u32) -> Option<&Command> {
        if self.wb_q.len() >= wbq_size as usize && !self.draining_wb && self.rd_q.is_empty() {
            self.draining_wb = true;
        }
        if self.wb_q.is_empty() {
            self.draining_wb = false;
        }
        if self.draining_wb {
            self.wb_q.first()
        } else {
            self.rd_q.first()
        }
    }

    /// Removes whatever `front` last returned, once the caller has issued
    /// it as a real read/write.
    pub fn pop_front(&mut self) {
        if self.draining_wb {
            if !self.wb_q.is_empty() {
                self.wb_q.remove(0);
            }
        } else if !self.rd_q.is_empty() {
            self.rd_q.remove(0);
        }
    }
}
