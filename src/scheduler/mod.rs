pub mod delivery;
pub mod retry;
pub mod time_interface;

pub use delivery::{DeliveryScheduler, StatusThrottle};
pub use retry::{BoundedRetry, RetryPoll, RetryStep};
pub use time_interface::{ManualTime, StdTimeSync, TimeInterface};
