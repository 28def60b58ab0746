//! ICS feed generation.

mod generate;

pub use generate::build_calendar;
