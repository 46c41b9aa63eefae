//! # transport
//!
//! Transport factories: HTTP/1.1 (standard pooling), HTTP/2, and HTTP/3
//! (via QUIC, feature-gated). All must tolerate self-signed TLS
//! certificates under scanner mode (spec §4.1).

use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Which protocol a client was built for. HTTP/3 is feature-gated: no
/// crate in the teacher's or the wider pack's dependency set provides an
/// HTTP/3 client, and SPEC_FULL.md §4.1 is explicit that fabricating a
/// vendored QUIC stack is worse than surfacing `NotSupported` when the
/// feature is off (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Http1,
    Http2,
    #[cfg(feature = "h3")]
    Http3,
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Http1
    }
}

/// Builds a `reqwest::Client` for the requested transport under scanner
/// TLS mode. `accept_invalid_certs` must only ever be set from
/// `EngineConfig::tls_accept_invalid_certs`, never hardcoded true at a
/// call site — the flag exists precisely so a caller can turn it off for
/// a hardened deployment. `follow_redirects` is false only for the
/// open-redirect audit's dedicated client (spec §4.1).
pub fn build_client(
    transport: Transport,
    accept_invalid_certs: bool,
    follow_redirects: bool,
) -> EngineResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .timeout(Duration::from_secs(60))
        .cookie_store(true)
        .redirect(if follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        });

    builder = match transport {
        Transport::Http1 => builder.http1_only(),
        Transport::Http2 => builder,
        #[cfg(feature = "h3")]
        Transport::Http3 => {
            return Err(EngineError::Internal(
                "HTTP/3 client requested but the h3 feature provides no real transport yet"
                    .to_string(),
            ))
        }
    };

    builder
        .build()
        .map_err(|e| EngineError::Transport(format!("failed to build client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http1_client_builds() {
        assert!(build_client(Transport::Http1, true, true).is_ok());
    }

    #[test]
    fn http2_client_builds() {
        assert!(build_client(Transport::Http2, false, false).is_ok());
    }
}
