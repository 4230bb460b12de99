//! Outbound notifications: rendering, delivery with retry, and the dispatcher that ties them to
//! the reservation table.

pub mod delivery;
pub mod dispatcher;
pub mod render;

pub use delivery::{DeliveryError, RetryPolicy};
pub use dispatcher::{CycleOutcome, DispatchError, Dispatcher, run_dispatcher};
pub use render::{Detail, format_price, render};
