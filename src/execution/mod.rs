//! The execution layer: turns a brain-produced trade intent into a
//! sized, preflight-checked, filled position, tracks its P&L, and
//! routes a slice of realized profit through the karma mechanism.

pub mod karma;
pub mod karma_governance;
pub mod oms;
pub mod paper;
pub mod pnl;
pub mod preflight;
pub mod sizer;

pub use karma::{KarmaEngine, KarmaIntent, KarmaReceipt};
pub use karma_governance::{GovernanceCheckResult, KarmaGovernance, LockedKarmaConfig, SettlementAuditEntry};
pub use oms::{Oms, OmsStatus};
pub use paper::{PaperBroker, PaperConfig, PaperFill};
pub use pnl::{PnlError, PnlSnapshot, PnlTracker};
pub use preflight::{GasRequirement, Preflight, PreflightResult};
pub use sizer::{default_sizer_from_risk, CorrelationAwareSizer, KellyParams, PositionSizer, SizerLimits};
