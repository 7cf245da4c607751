pub mod support;
pub mod unit;
