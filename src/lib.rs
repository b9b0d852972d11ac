pub mod config;
pub mod connectors;
pub mod core;
pub mod error;
pub mod journal;
pub mod logging;
pub mod monitoring;
pub mod oms;
pub mod session;
pub mod strategies;
pub mod traits;
pub mod types;

pub use types::{Price, Size, Symbol};
pub use crate::core::{MarketSnapshot, Order, OrderId, OrderSide, OrderStatus, Position};
pub use config::{
    ConfigError, CoreConfig, JournalConfig, LedgerConfig, MonitorConfig, RiskConfig,
    StrategyConfig,
};
pub use error::{ExecutionError, VenueError};
pub use journal::{EventLog, JournalError, LogEntry, LogStats};
pub use oms::ExecutionLedger;
pub use monitoring::{score_health, HealthMonitor, HealthStatus, TrackedPosition};
pub use traits::{
    Decision, PositionCloser, PositionTracker, PriceSource, Strategy, StrategyKind, Venue,
};
pub use strategies::{MomentumStrategy, ScalperStrategy, StrategyRegistry};
pub use connectors::MockVenue;
pub use session::TradingSession;
