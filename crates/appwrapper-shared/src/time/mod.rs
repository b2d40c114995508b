mod duration;

#[cfg(feature = "chrono")]
mod chrono_impl;

pub use duration::*;
