//! HTTP transport layer.

mod http_transport;
mod request;

pub use http_transport::{HttpTransport, ReqwestTransport};
pub use request::ApiRequest;
