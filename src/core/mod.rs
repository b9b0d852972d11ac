pub mod market;
pub mod order;
pub mod position;

pub use market::MarketSnapshot;
pub use order::{Order, OrderId, OrderSide, OrderStatus};
pub use position::Position;
