//! Stream combinators for report subscriptions

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
