pub mod client;
pub mod models;
pub mod transport;

pub use client::{ClientConfig, HttpTransport};
pub use transport::{ApiRequest, Method, Transport};

/// Path prefix every resource endpoint lives under
pub const API_PREFIX: &str = "/api/v1";

/// Used when neither `--api-url` nor `JUDGEBOARD_API_URL` is given
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default user agent - automatically uses the package version
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
