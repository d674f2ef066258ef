pub mod meter;
pub mod reading;

pub use meter::Meter;
pub use reading::{Reading, ReadingWithLocation};
