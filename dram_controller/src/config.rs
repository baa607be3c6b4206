//! TOML configuration loader with validation.
//!
//! Loads [`Config`], the complete set of geometry, timing, refresh/RFM/DRFM,
//! per-mitigator, and queueing parameters consumed by the core.

use std::path::Path;

use serde::Deserialize;

/// Which command-issuing queue structure the controller uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStructure {
    PerBank,
    PerRank,
}

/// Eager vs. lazy thresholding for RFM and DRFM scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MitigationPolicy {
    Eager,
    Lazy,
}

/// DREAM's three index-mapping schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DreamPolicy {
    SetAssociative,
    Staggered,
    Random,
}

/// Scope at which RFM is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfmMode {
    Disabled,
    SameBank,
    AllBank,
}

/// Scope at which a scheduled DRFM is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrfmMode {
    Bank,
    Bankset,
    Rank,
}

/// Whether the channel's timing needs the GDDR-specific t32AW window and
/// tPPD precharge spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Ddr5,
    Ddr4,
    Lpddr4,
    Gddr6,
}

impl Protocol {
    pub const fn is_gddr(self) -> bool {
        matches!(self, Self::Gddr6)
    }

    /// Protocols that require tPPD spacing between precharges across banks
    /// in the same rank.
    pub const fn needs_tppd(self) -> bool {
        matches!(self, Self::Gddr6 | Self::Lpddr4 | Self::Ddr5)
    }
}

/// Complete controller configuration. Every key consumed by the core
/// is a field here; nothing is read from the environment or a side file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // ── Geometry ──
    pub protocol: Protocol,
    pub ranks: u32,
    pub bankgroups: u32,
    pub banks_per_group: u32,
    pub rows: u32,
    pub columns: u32,

    // ── Generic timing (cycles) ──
    pub burst_cycle: u32,
    pub al: u32,
    pub wl: u32,
    pub t_ccd_l: u32,
    pub t_ccd_s: u32,
    pub t_rtrs: u32,
    pub t_rtp: u32,
    pub t_wtr_l: u32,
    pub t_wtr_s: u32,
    pub t_wr: u32,
    pub t_rp: u32,
    pub t_rrd_l: u32,
    pub t_rrd_s: u32,
    pub t_ras: u32,
    pub t_rcd: u32,
    pub t_rc: u32,
    pub t_ppd: u32,
    pub t_faw: u32,
    pub t32aw: u32,
    pub t_rcdrd: u32,
    pub t_rcdwr: u32,
    pub t_cke: u32,
    pub t_ckesr: u32,
    pub t_xs: u32,
    pub t_xp: u32,

    // ── Refresh ──
    pub fgr: bool,
    pub refchunks: u32,
    pub rows_refreshed: u32,
    pub ref_raa_decrement: u32,
    pub t_rfc: u32,
    pub t_rfcsb: u32,
    pub t_rfcb: u32,

    // ── RFM ──
    pub rfm_mode: RfmMode,
    pub rfm_policy: MitigationPolicy,
    pub raaimt: u32,
    pub raammt: u32,
    pub rfm_raa_decrement: u32,
    pub t_rfm: u32,
    pub t_rfmsb: u32,

    // ── DRFM ──
    pub drfm_mode: Option<DrfmMode>,
    pub drfm_policy: MitigationPolicy,
    pub drfm_qsize: u32,
    pub drfm_qth: u32,
    pub t_drfmb: u32,
    pub t_drfmsb: u32,
    pub t_drfmab: u32,

    // ── ALERT / ABO ──
    pub alert_mode: bool,
    pub t_abo_act: u32,
    pub abo_delay_acts: u32,
    pub t_abo_pw: u32,

    // ── MOAT ──
    pub moat_mode: bool,
    pub moatth: u32,

    // ── DREAM ──
    pub dream_mode: bool,
    pub dream_policy: DreamPolicy,
    pub dream_th: u32,
    pub dream_k: u32,
    pub dream_reset: u32,
    pub dream_prev_enable: bool,

    // ── MINT ──
    pub mint_mode: bool,
    pub mint_window: u32,

    // ── PARA ──
    pub para_mode: bool,
    pub para_prob: f64,

    // ── Graphene ──
    pub graphene_mode: bool,
    pub graphene_th: u32,
    pub graphene_table_size: u32,

    // ── Hydra ──
    pub hydra_mode: bool,
    pub hydra_th: u32,
    pub hydra_gct_size: u32,
    pub hydra_gct_th: u32,
    pub hydra_rcc_sets: u32,
    pub hydra_rcc_ways: u32,
    pub hydra_wbq_size: u32,

    // ── ABACUS ──
    pub abacus_mode: bool,
    pub abacus_th: u32,

    // ── Queueing ──
    pub queue_structure: QueueStructure,
    pub cmd_queue_size: u32,
}

impl Default for Config {
    /// DDR5-like defaults. Every field is still expected to be set
    /// explicitly by a real TOML config; this exists so `#[serde(default)]`
    /// has somewhere to fall back for fields a config omits, and so unit
    /// tests can build a `Config` tersely.
    fn default() -> Self {
        Self {
            protocol: Protocol::Ddr5,
            ranks: 1,
            bankgroups: 8,
            banks_per_group: 4,
            rows: 1 << 17,
            columns: 1024,

            burst_cycle: 4,
            al: 0,
            wl: 14,
            t_ccd_l: 8,
            t_ccd_s: 4,
            t_rtrs: 2,
            t_rtp: 12,
            t_wtr_l: 18,
            t_wtr_s: 6,
            t_wr: 24,
            t_rp: 16,
            t_rrd_l: 8,
            t_rrd_s: 4,
            t_ras: 34,
            t_rcd: 16,
            t_rc: 50,
            t_ppd: 4,
            t_faw: 30,
            t32aw: 0,
            t_rcdrd: 16,
            t_rcdwr: 16,
            t_cke: 8,
            t_ckesr: 9,
            t_xs: 300,
            t_xp: 8,

            fgr: false,
            refchunks: 1,
            rows_refreshed: 1,
            ref_raa_decrement: 0,
            t_rfc: 295,
            t_rfcsb: 160,
            t_rfcb: 140,

            rfm_mode: RfmMode::Disabled,
            rfm_policy: MitigationPolicy::Eager,
            raaimt: 32,
            raammt: 40,
            rfm_raa_decrement: 0,
            t_rfm: 200,
            t_rfmsb: 140,

            drfm_mode: None,
            drfm_policy: MitigationPolicy::Eager,
            drfm_qsize: 8,
            drfm_qth: 4,
            t_drfmb: 140,
            t_drfmsb: 160,
            t_drfmab: 295,

            alert_mode: false,
            t_abo_act: 180,
            abo_delay_acts: 0,
            t_abo_pw: 30,

            moat_mode: false,
            moatth: 0,

            dream_mode: false,
            dream_policy: DreamPolicy::SetAssociative,
            dream_th: 0,
            dream_k: 1,
            dream_reset: 1,
            dream_prev_enable: false,

            mint_mode: false,
            mint_window: 0,

            para_mode: false,
            para_prob: 0.0,

            graphene_mode: false,
            graphene_th: 0,
            graphene_table_size: 0,

            hydra_mode: false,
            hydra_th: 0,
            hydra_gct_size: 0,
            hydra_gct_th: 0,
            hydra_rcc_sets: 0,
            hydra_rcc_ways: 0,
            hydra_wbq_size: 0,

            abacus_mode: false,
            abacus_th: 0,

            queue_structure: QueueStructure::PerBank,
            cmd_queue_size: 16,
        }
    }
}

impl Config {
    #[inline]
    pub const fn banks(&self) -> u32 {
        self.bankgroups * self.banks_per_group
    }

    /// Number of mutually-exclusive RowHammer mitigation engines enabled.
    /// A bank runs at most one mitigation engine at a time, so enabling
    /// more than one here is a config error.
    fn enabled_mitigator_count(&self) -> u32 {
        [
            self.dream_mode,
            self.mint_mode,
            self.para_mode,
            self.graphene_mode,
            self.hydra_mode,
            self.moat_mode,
        ]
        .into_iter()
        .filter(|&enabled| enabled)
        .count() as u32
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bankgroups == 0 || self.banks_per_group == 0 {
            return Err("bankgroups and banks_per_group must be nonzero".to_string());
        }
        if self.rows == 0 || self.columns == 0 {
            return Err("rows and columns must be nonzero".to_string());
        }
        if self.ranks == 0 {
            return Err("ranks must be nonzero".to_string());
        }
        if self.refchunks == 0 {
            return Err("refchunks must be nonzero".to_string());
        }
        if self.cmd_queue_size == 0 {
            return Err("cmd_queue_size must be nonzero".to_string());
        }
        if matches!(self.queue_structure, QueueStructure::PerRank) {
            if self.rfm_mode == RfmMode::SameBank {
                return Err(
                    "PER_RANK queue structure cannot host same-bank RFM (REFsb/RFMsb requires per-bank addressing)"
                        .to_string(),
                );
            }
            if matches!(self.drfm_mode, Some(DrfmMode::Bankset) | Some(DrfmMode::Bank)) {
                return Err(
                    "PER_RANK queue structure cannot host bank- or bankset-scope DRFM".to_string(),
                );
            }
        }
        if self.enabled_mitigator_count() > 1 {
            return Err(format!(
                "at most one of {{dream,mint,para,graphene,hydra,moat}}_mode may be enabled at once, got {}",
                self.enabled_mitigator_count()
            ));
        }
        if self.hydra_mode && (self.hydra_gct_size == 0 || self.hydra_rcc_sets == 0 || self.hydra_rcc_ways == 0) {
            return Err("hydra_mode requires nonzero hydra_gct_size, hydra_rcc_sets, hydra_rcc_ways".to_string());
        }
        if self.graphene_mode && self.graphene_table_size == 0 {
            return Err("graphene_mode requires nonzero graphene_table_size".to_string());
        }
        if self.dream_mode && self.dream_k == 0 {
            return Err("dream_mode requires nonzero dream_k".to_string());
        }
        if self.para_mode && !(0.0..=1.0).contains(&self.para_prob) {
            return Err(format!("para_prob must be in [0, 1], got {}", self.para_prob));
        }
        if self.drfm_mode.is_some() && self.drfm_qsize == 0 {
            return Err("drfm_mode requires nonzero drfm_qsize".to_string());
        }
        Ok(())
    }
}

/// Configuration loading/validation error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "config I/O error: {e}"),
            Self::ParseError(e) => write!(f, "config parse error: {e}"),
            Self::ValidationError(e) => write!(f, "config validation: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate a [`Config`] from a TOML file on disk.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("failed to read {}: {e}", path.display())))?;
    load_config_from_str(&raw)
}

/// Load and validate a [`Config`] from a TOML string (used directly by
/// tests and benches, which construct configs inline).
pub fn load_config_from_str(toml_text: &str) -> Result<Config, ConfigError> {
    let config: Config =
        toml::from_str(toml_text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate().map_err(ConfigError::ValidationError)?;
    Ok(config)
}
