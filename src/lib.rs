//! pg-tls-proxy: a TLS-terminating relay for the Postgres wire protocol
//!
//! Clients connect in plaintext and ask for TLS with an SSLRequest. The proxy terminates
//! TLS, reads the StartupMessage, picks a backend from the startup parameters, opens its
//! own TLS connection to that backend and replays the startup. From then on bytes are
//! copied unchanged in both directions until either side closes.
//!
//! ```no_run
//! use pg_tls_proxy::config::ProxyConfig;
//! use pg_tls_proxy::proxy::Listener;
//!
//! # async fn example() -> pg_tls_proxy::Result<()> {
//! let config = ProxyConfig::builder()
//!     .identity("server.crt", "server.key")
//!     .target_addr("127.0.0.1:26257")
//!     .build();
//! let listen_addr = config.listen_addr.clone();
//!
//! let listener = Listener::bind(listen_addr, config.into_options()?).await?;
//! listener.run().await
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod proxy;

pub use error::{Error, Result};
pub use proxy::{serve_connection, Listener, ProxyOptions, RelayClosed};
