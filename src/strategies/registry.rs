use dashmap::DashMap;
use log::info;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::StrategyConfig;
use crate::error::ExecutionError;
use crate::strategies::{MomentumStrategy, ScalperStrategy};
use crate::traits::{Strategy, StrategyKind};

/// Builds a configured strategy instance
pub type StrategyFactory = Arc<dyn Fn(StrategyConfig) -> Arc<dyn Strategy> + Send + Sync>;

type Slot = Arc<RwLock<Option<Arc<dyn Strategy>>>>;

/// Strategy factories and the active instance per kind.
///
/// Each kind gets its own lock when it is registered, so creating or reading
/// one kind never contends with another.
#[derive(Default)]
pub struct StrategyRegistry {
    factories: DashMap<StrategyKind, StrategyFactory>,
    active: DashMap<StrategyKind, Slot>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the scalper and momentum strategies registered
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(StrategyKind::Scalper, |config| {
            Arc::new(ScalperStrategy::new(config))
        });
        registry.register(StrategyKind::Momentum, |config| {
            Arc::new(MomentumStrategy::new(config))
        });
        registry
    }

    /// Register (or replace) the factory for `kind`
    pub fn register<F>(&self, kind: StrategyKind, factory: F)
    where
        F: Fn(StrategyConfig) -> Arc<dyn Strategy> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
        self.active
            .entry(kind)
            .or_insert_with(|| Arc::new(RwLock::new(None)));
        info!("Registered strategy factory for {}", kind);
    }

    /// Instantiate a strategy from `config` and make it the active one for its kind
    pub async fn create(&self, config: StrategyConfig) -> Result<Arc<dyn Strategy>, ExecutionError> {
        let kind = config.kind;
        let factory = self
            .factories
            .get(&kind)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| ExecutionError::UnknownStrategy(kind.to_string()))?;
        let slot = self.slot(kind)?;

        let strategy = factory(config);
        strategy.validate()?;

        *slot.write().await = Some(Arc::clone(&strategy));
        info!(
            "Activated strategy {} v{} for {}",
            strategy.name(),
            strategy.version(),
            kind
        );
        Ok(strategy)
    }

    /// Active strategy for `kind`, if one was created
    pub async fn get(&self, kind: StrategyKind) -> Option<Arc<dyn Strategy>> {
        let slot = self.slot(kind).ok()?;
        let active = slot.read().await;
        active.clone()
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<StrategyKind> {
        let mut kinds: Vec<_> = self.factories.iter().map(|e| *e.key()).collect();
        kinds.sort();
        kinds
    }

    fn slot(&self, kind: StrategyKind) -> Result<Slot, ExecutionError> {
        self.active
            .get(&kind)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| ExecutionError::UnknownStrategy(kind.to_string()))
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = StrategyRegistry::with_builtin();
        assert_eq!(
            registry.kinds(),
            vec![StrategyKind::Scalper, StrategyKind::Momentum]
        );
        assert!(registry.get(StrategyKind::Scalper).await.is_none());

        let created = registry
            .create(StrategyConfig::new(StrategyKind::Scalper))
            .await
            .unwrap();
        assert_eq!(created.kind(), StrategyKind::Scalper);

        let active = registry.get(StrategyKind::Scalper).await.unwrap();
        assert_eq!(active.name(), "scalper_strategy");
        assert!(registry.get(StrategyKind::Momentum).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let registry = StrategyRegistry::with_builtin();
        let err = registry
            .create(StrategyConfig::new(StrategyKind::Grid))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnknownStrategy(kind) if kind == "grid"));
        assert!(registry.get(StrategyKind::Grid).await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_is_not_activated() {
        let registry = StrategyRegistry::with_builtin();
        let config = StrategyConfig::new(StrategyKind::Momentum).with_risk(RiskConfig {
            risk_per_trade: Decimal::ZERO,
            ..RiskConfig::default()
        });
        let err = registry.create(config).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Config(_)));
        assert!(registry.get(StrategyKind::Momentum).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_creates_on_distinct_kinds() {
        let registry = Arc::new(StrategyRegistry::with_builtin());
        let mut handles = Vec::new();
        for kind in [StrategyKind::Scalper, StrategyKind::Momentum] {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.create(StrategyConfig::new(kind)).await.map(|s| s.kind())
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert!(registry.get(StrategyKind::Momentum).await.is_some());
    }
}
