//! Request interception: adapters mutate each attempt before it is sent,
//! retry policies decide what happens after it fails.

mod adapter;
mod layer;
mod retry;

pub use adapter::{Authentication, AuthenticationAdapter, ParamKeyAdapter, RequestAdapter};
pub use layer::{Interceptor, InterceptorLayer, InterceptorService, RETRY_ATTEMPT_HEADER};
pub use retry::{
    AttemptFailure, BackoffRetryPolicy, ConnectionLostRetryPolicy, RetryContext, RetryDecision,
    RetryPolicy, calculate_backoff,
};
