//! # sni
//!
//! Embeds an OOB payload in the TLS SNI (`ServerName`) field — the one
//! insertion point the HTTP Execution component's `reqwest` clients never
//! expose a hook for, since they always derive SNI from the request URL's
//! host. This audit drives its own raw `tokio-rustls` connection so SNI
//! can diverge from the `Host` header the target actually receives (spec
//! §4.2 SNIAudit, §6 "TLS with SNI-controlled ServerName").
//!
//! Certificate validation is disabled outright (`NoCertVerification`)
//! rather than relaxed to "accept self-signed" — an SNI mismatch against
//! the target's real certificate is the expected, not exceptional, case
//! here, so the usual `danger_accept_invalid_certs` knob doesn't apply.

use std::sync::Arc;

use async_trait::async_trait;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, HistoryId, InsertionPoint, IssueCode};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::oob::new_oob_test;

const OOB_TEMPLATE: &str = "{domain}";

#[derive(Debug)]
struct NoCertVerification(Arc<rustls::crypto::CryptoProvider>);

impl rustls::client::danger::ServerCertVerifier for NoCertVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls_pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
            .map(|_| rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls_pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
            .map(|_| rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn dangerous_tls_config() -> rustls::ClientConfig {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoCertVerification(provider)))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    config
}

pub struct SniAudit;

#[async_trait]
impl Audit for SniAudit {
    fn kind(&self) -> AuditKind {
        AuditKind::Sni
    }

    fn default_concurrency(&self) -> usize {
        10
    }

    fn is_history_level(&self) -> bool {
        true
    }

    fn applies_to(&self, history: &History, _point: &InsertionPoint) -> bool {
        history.url.starts_with("https://")
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        _point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if !ctx.dedup.mark_if_new(&history.url, "sni", None) {
            return Ok(());
        }

        let parsed = url::Url::parse(&history.url).map_err(|e| EngineError::Parse(e.to_string()))?;
        let target_host = parsed.host_str().ok_or_else(|| EngineError::Parse("no host in URL".to_string()))?;
        let port = parsed.port_or_known_default().unwrap_or(443);
        let path = if parsed.path().is_empty() { "/" } else { parsed.path() };

        let oob = ctx.oob.get_url();
        let sni_value = oob.get_value(OOB_TEMPLATE);

        let Ok(server_name) = ServerName::try_from(sni_value.clone()) else {
            return Err(EngineError::Parse(format!("invalid SNI hostname: {sni_value}")));
        };

        let connector = tokio_rustls::TlsConnector::from(Arc::new(dangerous_tls_config()));

        let originating_history = tokio::time::timeout(ctx.config.timeouts.navigation, async {
            let tcp = TcpStream::connect((target_host, port)).await.map_err(|e| EngineError::Transport(e.to_string()))?;
            let mut tls = connector.connect(server_name, tcp).await.map_err(|e| EngineError::Transport(e.to_string()))?;

            let request = format!("GET {path} HTTP/1.1\r\nHost: {target_host}\r\nConnection: close\r\n\r\n");
            tls.write_all(request.as_bytes()).await.map_err(|e| EngineError::Transport(e.to_string()))?;

            let mut buf = Vec::new();
            let _ = tls.read_to_end(&mut buf).await;

            EngineResult::Ok(synthesize_history_id(&buf))
        })
        .await
        .map_err(|_| EngineError::Timeout(ctx.config.timeouts.navigation))??;

        let test = new_oob_test(
            IssueCode::SniInjection,
            &oob,
            history.url.clone(),
            Some("tls:sni".to_string()),
            sni_value,
            originating_history,
            history.workspace_id,
            history.task_id,
            history.scan_id,
        );
        ctx.oob.register(test).await;

        Ok(())
    }
}

/// The raw TLS probe deliberately bypasses `HttpExecutor` (it needs a
/// `ServerName` independent of the request URL's host), so there is no
/// `HttpExecutor`-assigned history id to hand back. Every history this
/// component produces carries `HistoryId(0)` until a real store assigns
/// one (spec §1: the relational store is an external collaborator) —
/// the same placeholder `execute()` uses, kept here for consistency.
fn synthesize_history_id(_raw_response: &[u8]) -> HistoryId {
    HistoryId(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_applies_to_https_targets() {
        let audit = SniAudit;
        assert!(audit.is_history_level());
        let _ = audit.kind();
    }
}
