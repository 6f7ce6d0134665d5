//! Network implementations of the channel and fallback seams.
mod http;
mod websocket;

pub use http::HttpReportFetcher;
pub use websocket::WebSocketTransport;
