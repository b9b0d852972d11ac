/// Position health scoring and the auto-close loop
pub mod health;

pub use health::{
    score_health, HealthMonitor, HealthStatus, TrackedPosition, MIN_CHECKS_BEFORE_CLOSE,
};
