//! Signal providers selectable per tenant.
//!
//! `ML` is the ensemble scored by [`ExecutionScorer`]. `ICT` is a market-structure
//! provider supplied from outside the engine; until one is wired in it is an
//! [`UnavailableProvider`]. `HYBRID` combines the two.

use crate::ensemble::EnsembleStrategy;
use crate::indicators::atr_checked;
use crate::scoring::ExecutionScorer;
use autotrader_core::instrument::{format_price, round_to};
use autotrader_core::position_sizing::MIN_LOTS;
use autotrader_core::{
    calculate_lot_size, calculate_sl_tp_levels, risk_reward, AccountRisk, CandleSeries,
    Direction, EngineError, ProviderSignal, ScoringConfig, Signal, SignalMethod, SignalProvider,
    StrategyConfig,
};
use std::sync::Arc;

/// Normalizes a provider proposal: prices to instrument precision, reward-to-risk
/// recomputed and a minimum-lot placeholder resized from the account risk.
fn finalize(mut signal: Signal, risk: &AccountRisk) -> Signal {
    let symbol = risk.symbol.as_str();
    if signal.lots <= MIN_LOTS {
        signal.lots = calculate_lot_size(
            risk.balance,
            risk.risk_percent,
            signal.entry,
            signal.stop_loss,
            symbol,
        );
    }
    signal.entry = format_price(signal.entry, symbol);
    signal.stop_loss = format_price(signal.stop_loss, symbol);
    signal.take_profit = format_price(signal.take_profit, symbol);
    signal.risk_reward = risk_reward(
        signal.direction,
        signal.entry,
        signal.stop_loss,
        signal.take_profit,
    );
    signal
}

/// Like [`finalize`], but always resizes lots from the final stop. Used where
/// the levels may no longer be the ones the lots were sized against.
fn resized(mut signal: Signal, risk: &AccountRisk) -> Signal {
    signal.lots = calculate_lot_size(
        risk.balance,
        risk.risk_percent,
        signal.entry,
        signal.stop_loss,
        &risk.symbol,
    );
    finalize(signal, risk)
}

/// Ensemble strategy plus execution scorer.
pub struct EnsembleProvider {
    ensemble: EnsembleStrategy,
    scorer: ExecutionScorer,
}

impl EnsembleProvider {
    pub const METHOD: &'static str = "ML";

    #[must_use]
    pub fn new(strategy: StrategyConfig, scoring: ScoringConfig) -> Self {
        Self {
            ensemble: EnsembleStrategy::new(strategy),
            scorer: ExecutionScorer::new(scoring),
        }
    }
}

impl SignalProvider for EnsembleProvider {
    fn name(&self) -> &str {
        Self::METHOD
    }

    fn analyze(
        &self,
        series: &CandleSeries,
        risk: &AccountRisk,
    ) -> Result<Option<ProviderSignal>, EngineError> {
        let result = self.ensemble.evaluate(series, risk)?;
        let Some(signal) = result.outcome.top_signal() else {
            return Ok(None);
        };
        let score = self.scorer.score(&result);

        Ok(Some(ProviderSignal {
            symbol: risk.symbol.clone(),
            signal: finalize(signal.clone(), risk),
            probability: score.probability,
            rationale: score.rationale,
            method: Self::METHOD.to_string(),
            current_price: result.outcome.current_price,
            atr: atr_checked(series.highs(), series.lows(), series.closes(), 14),
        }))
    }
}

/// Stand-in for a provider that has not been wired into this process.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    name: String,
}

impl UnavailableProvider {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl SignalProvider for UnavailableProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn analyze(
        &self,
        _series: &CandleSeries,
        _risk: &AccountRisk,
    ) -> Result<Option<ProviderSignal>, EngineError> {
        Err(EngineError::ProviderUnavailable(self.name.clone()))
    }
}

/// Combines the ensemble with a market-structure provider.
///
/// In order of preference:
/// * both agree on direction: `min(95, mean + 15)`, target widened to the
///   farther of the two (`HYBRID_AGREE`)
/// * ensemble alone at 70 or more: 90% of its probability (`HYBRID_ML`)
/// * structure alone at 70 or more: 90% of its probability with ATR levels at
///   2:1 (`HYBRID_ICT`)
/// * any ensemble signal: 80% of its probability (`HYBRID_ML_WEAK`)
///
/// Every path resizes lots from the final stop. A failing structure provider
/// counts as neutral.
pub struct HybridProvider {
    ml: Arc<dyn SignalProvider>,
    structure: Arc<dyn SignalProvider>,
}

impl HybridProvider {
    const STRONG: f64 = 70.0;
    const AGREEMENT_BONUS: f64 = 15.0;
    const MAX_PROBABILITY: f64 = 95.0;

    #[must_use]
    pub fn new(ml: Arc<dyn SignalProvider>, structure: Arc<dyn SignalProvider>) -> Self {
        Self { ml, structure }
    }

    fn combine(
        ml: Option<ProviderSignal>,
        structure: Option<ProviderSignal>,
        risk: &AccountRisk,
    ) -> Option<ProviderSignal> {
        let structure = structure.filter(|s| s.signal.direction.is_directional());

        if let (Some(ml), Some(st)) = (&ml, &structure) {
            if ml.signal.direction == st.signal.direction {
                let mut signal = ml.signal.clone();
                signal.take_profit = match signal.direction {
                    Direction::Buy => signal.take_profit.max(st.signal.take_profit),
                    _ => signal.take_profit.min(st.signal.take_profit),
                };
                let probability = ((ml.probability + st.probability) / 2.0
                    + Self::AGREEMENT_BONUS)
                    .min(Self::MAX_PROBABILITY);
                return Some(ProviderSignal {
                    signal: resized(signal, risk),
                    probability: round_to(probability, 1),
                    rationale: format!("ML and structure agree: {}", ml.rationale),
                    method: "HYBRID_AGREE".to_string(),
                    ..ml.clone()
                });
            }
        }

        if let Some(ml) = ml.as_ref().filter(|m| m.probability >= Self::STRONG) {
            return Some(ProviderSignal {
                signal: resized(ml.signal.clone(), risk),
                probability: round_to(ml.probability * 0.9, 1),
                rationale: format!("Strong ML signal: {}", ml.rationale),
                method: "HYBRID_ML".to_string(),
                ..ml.clone()
            });
        }

        if let Some(st) = structure.filter(|s| s.probability >= Self::STRONG) {
            let direction = st.signal.direction;
            let entry = st.signal.entry;
            let (stop_loss, take_profit) =
                calculate_sl_tp_levels(entry, direction, st.atr, &risk.symbol, 2.0);
            let signal = Signal {
                direction,
                entry,
                stop_loss,
                take_profit,
                lots: 0.0,
                confidence: st.signal.confidence,
                risk_reward: 0.0,
                reason: st.signal.reason.clone(),
            };
            return Some(ProviderSignal {
                signal: resized(signal, risk),
                probability: round_to(st.probability * 0.9, 1),
                rationale: format!("Strong structure signal: {}", st.rationale),
                method: "HYBRID_ICT".to_string(),
                ..st
            });
        }

        ml.map(|ml| ProviderSignal {
            signal: resized(ml.signal.clone(), risk),
            probability: round_to(ml.probability * 0.8, 1),
            rationale: format!("Weak ML signal: {}", ml.rationale),
            method: "HYBRID_ML_WEAK".to_string(),
            ..ml
        })
    }
}

impl SignalProvider for HybridProvider {
    fn name(&self) -> &str {
        "HYBRID"
    }

    fn analyze(
        &self,
        series: &CandleSeries,
        risk: &AccountRisk,
    ) -> Result<Option<ProviderSignal>, EngineError> {
        let ml = self.ml.analyze(series, risk)?;
        let structure = match self.structure.analyze(series, risk) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::debug!(
                    provider = self.structure.name(),
                    error = %e,
                    "Structure provider treated as neutral"
                );
                None
            }
        };
        Ok(Self::combine(ml, structure, risk))
    }
}

/// Resolves a tenant's [`SignalMethod`] to a provider.
#[derive(Clone)]
pub struct ProviderRegistry {
    ml: Arc<dyn SignalProvider>,
    ict: Arc<dyn SignalProvider>,
    hybrid: Arc<dyn SignalProvider>,
}

impl ProviderRegistry {
    /// Ensemble-backed registry with no structure provider.
    #[must_use]
    pub fn new(strategy: StrategyConfig, scoring: ScoringConfig) -> Self {
        let ml: Arc<dyn SignalProvider> = Arc::new(EnsembleProvider::new(strategy, scoring));
        Self::with_providers(ml, Arc::new(UnavailableProvider::new("ICT")))
    }

    #[must_use]
    pub fn with_providers(ml: Arc<dyn SignalProvider>, ict: Arc<dyn SignalProvider>) -> Self {
        let hybrid = Arc::new(HybridProvider::new(Arc::clone(&ml), Arc::clone(&ict)));
        Self { ml, ict, hybrid }
    }

    /// Replaces the structure provider, rebuilding the hybrid around it.
    #[must_use]
    pub fn with_structure_provider(self, ict: Arc<dyn SignalProvider>) -> Self {
        Self::with_providers(self.ml, ict)
    }

    #[must_use]
    pub fn for_method(&self, method: SignalMethod) -> Arc<dyn SignalProvider> {
        match method {
            SignalMethod::Ml => Arc::clone(&self.ml),
            SignalMethod::Ict => Arc::clone(&self.ict),
            SignalMethod::Hybrid => Arc::clone(&self.hybrid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{flat, rally_with_expansion, series, steady_rally};

    struct Fixed(Option<ProviderSignal>);

    impl SignalProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn analyze(
            &self,
            _series: &CandleSeries,
            _risk: &AccountRisk,
        ) -> Result<Option<ProviderSignal>, EngineError> {
            Ok(self.0.clone())
        }
    }

    fn proposal(direction: Direction, probability: f64, take_profit: f64) -> ProviderSignal {
        let stop_loss = if direction == Direction::Buy { 1.098 } else { 1.102 };
        ProviderSignal {
            symbol: "EUR/USD".to_string(),
            signal: Signal {
                direction,
                entry: 1.1,
                stop_loss,
                take_profit,
                lots: 2.0,
                confidence: probability,
                risk_reward: 1.5,
                reason: "fixed".to_string(),
            },
            probability,
            rationale: "fixed".to_string(),
            method: "ML".to_string(),
            current_price: 1.1,
            atr: Some(0.002),
        }
    }

    fn hybrid(ml: Option<ProviderSignal>, structure: Option<ProviderSignal>) -> HybridProvider {
        HybridProvider::new(Arc::new(Fixed(ml)), Arc::new(Fixed(structure)))
    }

    fn run(provider: &dyn SignalProvider) -> Option<ProviderSignal> {
        provider
            .analyze(&series(flat(60, 1.1, 0.001)), &AccountRisk::default())
            .unwrap()
    }

    #[test]
    fn test_ensemble_provider_scores_and_formats() {
        let provider = EnsembleProvider::new(StrategyConfig::default(), ScoringConfig::default());
        let result = provider
            .analyze(&rally_with_expansion(), &AccountRisk::default())
            .unwrap()
            .unwrap();
        assert_eq!(result.method, "ML");
        assert_eq!(result.signal.direction, Direction::Buy);
        assert!((result.probability - 70.2).abs() < 1e-9);
        assert!(result.atr.is_some());
        assert!((result.signal.entry - 1.065).abs() < 1e-9);
    }

    #[test]
    fn test_ensemble_provider_without_signal() {
        let provider = EnsembleProvider::new(StrategyConfig::default(), ScoringConfig::default());
        assert!(provider
            .analyze(&steady_rally(60), &AccountRisk::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_hybrid_agreement_boosts_and_widens_target() {
        let provider = hybrid(
            Some(proposal(Direction::Buy, 60.0, 1.103)),
            Some(proposal(Direction::Buy, 70.0, 1.106)),
        );
        let result = run(&provider).unwrap();
        assert_eq!(result.method, "HYBRID_AGREE");
        assert!((result.probability - 80.0).abs() < 1e-9);
        assert!((result.signal.take_profit - 1.106).abs() < 1e-9);
        assert!((result.signal.risk_reward - 3.0).abs() < 1e-9);
        // $100 risk over the 20 pip stop, not the proposal's 2 lots
        assert!((result.signal.lots - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_hybrid_agreement_is_capped() {
        let provider = hybrid(
            Some(proposal(Direction::Sell, 90.0, 1.097)),
            Some(proposal(Direction::Sell, 90.0, 1.096)),
        );
        let result = run(&provider).unwrap();
        assert!((result.probability - 95.0).abs() < 1e-9);
        assert!((result.signal.take_profit - 1.096).abs() < 1e-9);
    }

    #[test]
    fn test_hybrid_strong_ml_wins_disagreement() {
        let provider = hybrid(
            Some(proposal(Direction::Buy, 80.0, 1.103)),
            Some(proposal(Direction::Sell, 90.0, 1.097)),
        );
        let result = run(&provider).unwrap();
        assert_eq!(result.method, "HYBRID_ML");
        assert_eq!(result.signal.direction, Direction::Buy);
        assert!((result.probability - 72.0).abs() < 1e-9);
        assert!((result.signal.lots - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_hybrid_strong_structure_gets_atr_levels() {
        let provider = hybrid(
            Some(proposal(Direction::Buy, 50.0, 1.103)),
            Some(proposal(Direction::Sell, 80.0, 1.097)),
        );
        let result = run(&provider).unwrap();
        assert_eq!(result.method, "HYBRID_ICT");
        assert_eq!(result.signal.direction, Direction::Sell);
        assert!((result.probability - 72.0).abs() < 1e-9);
        // 1.5 × ATR 0.002 = 30 pips stop, 60 pips target
        assert!((result.signal.stop_loss - 1.103).abs() < 1e-9);
        assert!((result.signal.take_profit - 1.094).abs() < 1e-9);
        assert!((result.signal.risk_reward - 2.0).abs() < 1e-9);
        // $100 risk over 30 pips
        assert!((result.signal.lots - 0.33).abs() < 1e-9);
    }

    #[test]
    fn test_hybrid_weak_ml_and_nothing() {
        let weak = hybrid(Some(proposal(Direction::Buy, 50.0, 1.103)), None);
        let result = run(&weak).unwrap();
        assert_eq!(result.method, "HYBRID_ML_WEAK");
        assert!((result.probability - 40.0).abs() < 1e-9);
        assert!((result.signal.lots - 0.5).abs() < 1e-9);

        assert!(run(&hybrid(None, Some(proposal(Direction::Buy, 60.0, 1.103)))).is_none());
    }

    #[test]
    fn test_hybrid_treats_unavailable_structure_as_neutral() {
        let provider = HybridProvider::new(
            Arc::new(Fixed(Some(proposal(Direction::Buy, 75.0, 1.103)))),
            Arc::new(UnavailableProvider::new("ICT")),
        );
        assert_eq!(run(&provider).unwrap().method, "HYBRID_ML");
    }

    #[test]
    fn test_registry_resolves_methods() {
        let registry = ProviderRegistry::new(StrategyConfig::default(), ScoringConfig::default());
        assert_eq!(registry.for_method(SignalMethod::Ml).name(), "ML");
        assert_eq!(registry.for_method(SignalMethod::Hybrid).name(), "HYBRID");

        let ict = registry.for_method(SignalMethod::Ict);
        assert!(matches!(
            ict.analyze(&rally_with_expansion(), &AccountRisk::default()),
            Err(EngineError::ProviderUnavailable(_))
        ));

        let registry = registry.with_structure_provider(Arc::new(Fixed(None)));
        assert!(registry
            .for_method(SignalMethod::Ict)
            .analyze(&rally_with_expansion(), &AccountRisk::default())
            .unwrap()
            .is_none());
    }
}
