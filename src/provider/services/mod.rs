//! Call policy applied to adapter invocations.

mod call;

pub use call::{CallPolicy, RetryPolicy, call_with_retry, with_deadline};
