#![cfg_attr(feature = "nightly", feature(backtrace))]

pub mod error;
pub mod logger;
pub mod process_props;
