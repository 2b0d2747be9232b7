//! Tower layers of the transport stack that are not interception.
//!
//! - [`DefaultHeadersLayer`] - Adds User-Agent and configured default headers

mod default_headers;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
