//! Network layer.
//!
//! # Data Flow
//! ```text
//! listener.tls present:
//!     tls.rs (validate PEM files → RustlsConfig)
//!     → axum-server rustls acceptor (HTTP/1.1 + HTTP/2 via ALPN)
//!
//! listener.tls absent:
//!     plain TCP listener → axum::serve
//! ```

pub mod tls;

pub use tls::{TlsError, load_tls_config};
