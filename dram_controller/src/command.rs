//! Command type, address tuple, and the tagged command value issued between
//! queue, channel, and bank.

/// The closed command enumeration. This is the wire/protocol surface:
/// nothing outside this set is ever issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    Read = 0,
    Write,
    ReadPrecharge,
    WritePrecharge,
    Activate,
    Precharge,
    PreAb,
    PreSb,
    RefreshBank,
    RefSb,
    RefAb,
    SrefEnter,
    SrefExit,
    RfmSb,
    RfmAb,
    DrfmB,
    DrfmSb,
    DrfmAb,
}

static_assertions::assert_eq_size!(CommandType, u8);

impl CommandType {
    /// Number of distinct command types, for table sizing.
    pub const COUNT: usize = 18;

    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Read,
            1 => Self::Write,
            2 => Self::ReadPrecharge,
            3 => Self::WritePrecharge,
            4 => Self::Activate,
            5 => Self::Precharge,
            6 => Self::PreAb,
            7 => Self::PreSb,
            8 => Self::RefreshBank,
            9 => Self::RefSb,
            10 => Self::RefAb,
            11 => Self::SrefEnter,
            12 => Self::SrefExit,
            13 => Self::RfmSb,
            14 => Self::RfmAb,
            15 => Self::DrfmB,
            16 => Self::DrfmSb,
            17 => Self::DrfmAb,
            _ => return None,
        })
    }

    #[inline]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadPrecharge)
    }

    #[inline]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::WritePrecharge)
    }

    #[inline]
    pub const fn is_read_write(self) -> bool {
        self.is_read() || self.is_write()
    }

    #[inline]
    pub const fn is_precharge(self) -> bool {
        matches!(
            self,
            Self::Precharge | Self::PreAb | Self::PreSb | Self::ReadPrecharge | Self::WritePrecharge
        )
    }

    #[inline]
    pub const fn is_refresh(self) -> bool {
        matches!(self, Self::RefreshBank | Self::RefSb | Self::RefAb)
    }

    #[inline]
    pub const fn is_rfm(self) -> bool {
        matches!(self, Self::RfmSb | Self::RfmAb)
    }

    #[inline]
    pub const fn is_drfm(self) -> bool {
        matches!(self, Self::DrfmB | Self::DrfmSb | Self::DrfmAb)
    }

    /// Rank-scope commands: issued against every bank of a rank at once.
    #[inline]
    pub const fn is_rank_cmd(self) -> bool {
        matches!(
            self,
            Self::RefAb | Self::RfmAb | Self::DrfmAb | Self::SrefEnter | Self::SrefExit
        )
    }

    /// Bankset-scope commands: issued against the same bank index across
    /// every bankgroup of a rank.
    #[inline]
    pub const fn is_bankset_cmd(self) -> bool {
        matches!(self, Self::RefSb | Self::RfmSb | Self::DrfmSb)
    }
}

/// `(channel, rank, bankgroup, bank, row, column)` with `-1` as the
/// "don't care" sentinel on any field, used by rank-/bankset-/bank-scope
/// commands that don't address every coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Address {
    pub channel: i32,
    pub rank: i32,
    pub bankgroup: i32,
    pub bank: i32,
    pub row: i32,
    pub column: i32,
}

impl Address {
    pub const DONT_CARE: i32 = -1;

    pub const fn new(channel: i32, rank: i32, bankgroup: i32, bank: i32, row: i32, column: i32) -> Self {
        Self {
            channel,
            rank,
            bankgroup,
            bank,
            row,
            column,
        }
    }

    pub const fn rank_scope(channel: i32, rank: i32) -> Self {
        Self::new(channel, rank, Self::DONT_CARE, Self::DONT_CARE, Self::DONT_CARE, Self::DONT_CARE)
    }

    pub const fn bankset_scope(channel: i32, rank: i32, bank: i32) -> Self {
        Self::new(channel, rank, Self::DONT_CARE, bank, Self::DONT_CARE, Self::DONT_CARE)
    }

    pub const fn bank_scope(channel: i32, rank: i32, bankgroup: i32, bank: i32) -> Self {
        Self::new(channel, rank, bankgroup, bank, Self::DONT_CARE, Self::DONT_CARE)
    }
}

/// A command in flight: its type, the address it targets, and the raw
/// hex address of the originating request (`-1` for Hydra-synthesized
/// commands, which never sit in a `CommandQueue`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub cmd_type: CommandType,
    pub addr: Address,
    pub hex_addr: i64,
}

impl Command {
    pub const fn new(cmd_type: CommandType, addr: Address, hex_addr: i64) -> Self {
        Self {
            cmd_type,
            addr,
            hex_addr,
        }
    }

    #[inline]
    pub const fn is_read_write(&self) -> bool {
        self.cmd_type.is_read_write()
    }

    /// Hydra-synthesized commands use the `-1` sentinel hex address and are
    /// never present in a `CommandQueue` slot.
    #[inline]
    pub const fn is_hydra_synthesized(&self) -> bool {
        self.hex_addr == -1
    }
}
