//! Position sizing: half-Kelly scaled by conviction, then throttled by
//! correlation to the existing portfolio.
//!
//! Conviction is a soft scaling layer on top of the Kelly fraction, not a
//! source of leverage — leverage is set by the decision policy's tier,
//! not by this module.

#[derive(Debug, Clone, Copy)]
pub struct KellyParams {
    /// Probability of winning, `[0, 1]`.
    pub p: f64,
    /// Payoff ratio (avg win / avg loss), must be > 0.
    pub b: f64,
    /// Half-Kelly by default.
    pub fraction_multiplier: f64,
}

impl Default for KellyParams {
    fn default() -> Self {
        KellyParams {
            p: 0.55,
            b: 1.2,
            fraction_multiplier: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SizerLimits {
    pub max_position_pct: f64,
    pub min_position_usd: f64,
}

impl Default for SizerLimits {
    fn default() -> Self {
        SizerLimits {
            max_position_pct: 0.10,
            min_position_usd: 10.0,
        }
    }
}

pub struct PositionSizer {
    kelly: KellyParams,
    limits: SizerLimits,
}

impl PositionSizer {
    pub fn new(kelly: KellyParams, limits: SizerLimits) -> Self {
        PositionSizer { kelly, limits }
    }

    /// `(b*p - (1-p)) / b`, floored at zero, then halved (or whatever
    /// `fraction_multiplier` says).
    pub fn kelly_fraction(&self) -> f64 {
        let p = self.kelly.p.clamp(0.0, 1.0);
        let b = self.kelly.b.max(1e-9);
        let q = 1.0 - p;
        let f = ((b * p - q) / b).max(0.0);
        f * self.kelly.fraction_multiplier
    }

    /// Notional position size in USD. `conviction_score` is `[0, 1]` and
    /// scales the Kelly fraction between 0.25x and 1.0x — conviction
    /// never takes a position to zero on its own, only Kelly or the cap
    /// does.
    pub fn size_usd(&self, equity_usd: f64, conviction_score: f64, max_position_pct: Option<f64>) -> f64 {
        let equity = equity_usd.max(0.0);
        if equity <= 0.0 {
            return 0.0;
        }

        let conviction = conviction_score.clamp(0.0, 1.0);
        let scale = 0.25 + 0.75 * conviction;

        let cap_pct = max_position_pct.unwrap_or(self.limits.max_position_pct);
        let fraction = (self.kelly_fraction() * scale).min(cap_pct);

        let notional = equity * fraction;
        if notional < self.limits.min_position_usd {
            0.0
        } else {
            notional
        }
    }

    pub fn limits(&self) -> SizerLimits {
        self.limits
    }
}

/// Wraps a base sizer with correlation-aware throttling: a new trade that
/// is highly correlated with an already-hot portfolio gets sized down,
/// proportional to both the correlation and the current heat.
pub struct CorrelationAwareSizer {
    base: PositionSizer,
}

impl CorrelationAwareSizer {
    pub fn new(base: PositionSizer) -> Self {
        CorrelationAwareSizer { base }
    }

    pub fn size_usd(
        &self,
        equity_usd: f64,
        conviction_score: f64,
        corr_to_portfolio: f64,
        portfolio_heat_pct: f64,
        max_position_pct: Option<f64>,
    ) -> f64 {
        let base_size = self.base.size_usd(equity_usd, conviction_score, max_position_pct);
        if base_size <= 0.0 {
            return 0.0;
        }

        let corr = corr_to_portfolio.abs().clamp(0.0, 1.0);
        let heat = portfolio_heat_pct.clamp(0.0, 1.0);
        let multiplier = (1.0 - corr * heat).max(0.0);
        let sized = base_size * multiplier;

        if sized < self.base.limits().min_position_usd {
            0.0
        } else {
            sized
        }
    }
}

pub fn default_sizer_from_risk(max_position_pct: f64) -> CorrelationAwareSizer {
    let base = PositionSizer::new(
        KellyParams::default(),
        SizerLimits {
            max_position_pct,
            min_position_usd: 10.0,
        },
    );
    CorrelationAwareSizer::new(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kelly_fraction_is_half_of_the_raw_edge() {
        let sizer = PositionSizer::new(KellyParams::default(), SizerLimits::default());
        // (1.2*0.55 - 0.45) / 1.2 = 0.175, halved = 0.0875
        assert!((sizer.kelly_fraction() - 0.0875).abs() < 1e-6);
    }

    #[test]
    fn full_conviction_sizes_larger_than_low_conviction() {
        let sizer = PositionSizer::new(KellyParams::default(), SizerLimits::default());
        let low = sizer.size_usd(100_000.0, 0.0, None);
        let high = sizer.size_usd(100_000.0, 1.0, None);
        assert!(high > low);
    }

    #[test]
    fn below_minimum_notional_rounds_to_zero() {
        let sizer = PositionSizer::new(KellyParams::default(), SizerLimits::default());
        assert_eq!(sizer.size_usd(1.0, 1.0, None), 0.0);
    }

    #[test]
    fn high_correlation_and_heat_throttles_the_base_size() {
        let base = PositionSizer::new(KellyParams::default(), SizerLimits::default());
        let corr_sizer = CorrelationAwareSizer::new(base);
        let throttled = corr_sizer.size_usd(100_000.0, 1.0, 0.9, 0.9, None);
        let unthrottled = corr_sizer.size_usd(100_000.0, 1.0, 0.0, 0.0, None);
        assert!(throttled < unthrottled);
    }
}
