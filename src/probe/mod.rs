//! Probe execution
//!
//! - `transport`: the HTTP capability (direct or via an authenticated proxy)
//! - `prober`: one timed round-trip turned into a `ProbeResult`

pub mod prober;
pub mod transport;

pub use prober::Prober;
pub use transport::{
    HttpResponse, HttpTransport, PendingResponse, ReqwestTransport, ACCEPT_LANGUAGE_VALUE,
};
