pub mod lifecycle;
pub mod strategy;
pub mod venue;

pub use lifecycle::{PositionCloser, PositionTracker};
pub use strategy::{Decision, Strategy, StrategyKind};
pub use venue::{PriceSource, Venue};
