pub mod builder;
pub mod period;

pub use builder::TaskQuery;
pub use period::{DateRange, EndBound, Period, PeriodRange};
