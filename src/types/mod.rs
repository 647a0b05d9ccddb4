mod models;
mod period;

pub use models::*;
pub use period::{GoalPeriod, month_bounds};
