//! Upstream result providers.
//!
//! The aggregator only depends on the [`ResultSource`] trait; the HTTP source
//! talks to the public static JSON host and the in-memory source backs tests.

mod http;
mod memory;
mod traits;

pub(crate) use http::get_json;
pub use http::HttpResultSource;
pub use memory::InMemorySource;
pub use traits::ResultSource;
