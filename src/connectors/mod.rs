pub mod mock;

pub use mock::{MockError, MockVenue};
