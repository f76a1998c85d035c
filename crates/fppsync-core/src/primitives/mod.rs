//! Semantic primitives: time/date values with
//! hard/symbolic variants, half-open intervals, weekday sets, date-parity,
//! the holiday resolver and the symbolic-time display estimator.

pub mod date;
pub mod holiday;
pub mod interval;
pub mod suntime;
pub mod time;
pub mod weekday;

pub use date::{DatePattern, DateValue};
pub use holiday::HolidayToken;
pub use interval::{DailyWindow, Interval};
pub use suntime::estimate_symbolic_seconds;
pub use time::{HardTime, SymbolicToken, TimeValue};
pub use weekday::{DateParity, Weekday, WeekdayConstraint, Weekdays};
