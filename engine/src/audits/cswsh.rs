//! # cswsh
//!
//! Cross-site WebSocket hijacking (spec §4.2 CSWSHScan). Baseline:
//! same-origin handshake must succeed. Then tests attacker-origin,
//! null-origin, missing-Origin, and subdomain permutations; once the
//! attacker origin accepts, lesser tests are skipped. Generates a
//! self-contained HTML proof-of-concept.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use sukyan_types::{History, InsertionPoint, IssueCode};

use crate::audits::{Audit, AuditContext, AuditKind};
use crate::error::{EngineError, EngineResult};
use crate::issues::NewIssue;

/// How long to wait for a reply to one replayed message before counting it
/// as unanswered. Short: this is a signal of "is the session live", not a
/// correctness check on the target's response semantics.
const REPLY_WAIT: std::time::Duration = std::time::Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OriginProbe {
    SameOrigin,
    Attacker,
    Null,
    Missing,
    Subdomain,
}

impl OriginProbe {
    /// Base confidence plus the spec §4.2 "+5 when messages were
    /// exchanged" bonus. Capped implicitly: the highest base (90) plus
    /// the bonus is 95, still under 100.
    fn confidence(&self, messages_exchanged: bool) -> u8 {
        let base = match self {
            OriginProbe::SameOrigin => 0,
            OriginProbe::Attacker => 90,
            OriginProbe::Null => 85,
            OriginProbe::Missing => 80,
            OriginProbe::Subdomain => 75,
        };
        if *self != OriginProbe::SameOrigin && messages_exchanged {
            base + 5
        } else {
            base
        }
    }

    fn label(&self) -> &'static str {
        match self {
            OriginProbe::SameOrigin => "same-origin",
            OriginProbe::Attacker => "attacker-origin",
            OriginProbe::Null => "null-origin",
            OriginProbe::Missing => "missing-origin",
            OriginProbe::Subdomain => "subdomain",
        }
    }
}

/// Outcome of one handshake attempt, including the sent-direction replay
/// tally spec §4.2 calls for ("optionally replays sent-direction messages
/// from the captured session and tallies sent/received counts").
struct HandshakeOutcome {
    accepted: bool,
    sent: Vec<String>,
    received: usize,
}

impl HandshakeOutcome {
    fn messages_exchanged(&self) -> bool {
        !self.sent.is_empty() && self.received > 0
    }
}

fn same_origin(url: &url::Url) -> String {
    format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default())
}

fn subdomain_origin(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(format!("{}://attacker-subdomain.{host}", url.scheme()))
}

/// Connects with the given `Origin`, then — if the handshake is
/// accepted and the captured session has sent-direction messages to
/// replay — sends each one in turn, waiting briefly for a reply so the
/// sent/received tally spec §4.2 asks for is meaningful rather than just
/// a send-and-forget count.
async fn attempt_handshake(ws_url: &str, origin: Option<&str>, replay: &[String]) -> EngineResult<HandshakeOutcome> {
    let mut request = ws_url
        .into_client_request()
        .map_err(|e| EngineError::Parse(format!("invalid websocket URL: {e}")))?;
    match origin {
        Some(o) => {
            let value = HeaderValue::from_str(o).map_err(|e| EngineError::Internal(e.to_string()))?;
            request.headers_mut().insert("Origin", value);
        }
        None => {
            request.headers_mut().remove("Origin");
        }
    }

    let mut stream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(_) => {
            return Ok(HandshakeOutcome {
                accepted: false,
                sent: Vec::new(),
                received: 0,
            })
        }
    };

    let mut sent = Vec::new();
    let mut received = 0usize;
    for payload in replay {
        if stream.send(Message::Text(payload.clone())).await.is_err() {
            break;
        }
        sent.push(payload.clone());
        if let Ok(Some(Ok(_))) = tokio::time::timeout(REPLY_WAIT, stream.next()).await {
            received += 1;
        }
    }
    let _ = stream.close(None).await;

    Ok(HandshakeOutcome { accepted: true, sent, received })
}

pub struct CswshScan;

#[async_trait]
impl Audit for CswshScan {
    fn kind(&self) -> AuditKind {
        AuditKind::Cswsh
    }

    fn default_concurrency(&self) -> usize {
        5
    }

    fn is_history_level(&self) -> bool {
        true
    }

    fn applies_to(&self, history: &History, _point: &InsertionPoint) -> bool {
        history.url.starts_with("ws://") || history.url.starts_with("wss://")
    }

    async fn run(
        &self,
        ctx: &AuditContext<'_>,
        history: &History,
        _point: &InsertionPoint,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        if !ctx.dedup.mark_if_new(&history.url, "cswsh", None) {
            return Ok(());
        }

        let parsed = url::Url::parse(&history.url).map_err(|e| EngineError::Parse(e.to_string()))?;
        let same = same_origin(&parsed);

        let baseline = tokio::time::timeout(
            ctx.config.timeouts.cswsh_per_origin,
            attempt_handshake(&history.url, Some(&same), &[]),
        )
        .await
        .map_err(|_| EngineError::Timeout(ctx.config.timeouts.cswsh_per_origin))??;

        if !baseline.accepted {
            // Spec §8 boundary: "CSWSH secure server (only same-origin
            // accepted) yields 0 confidence and no issue" covers the
            // inverse too — if even same-origin is rejected, the
            // endpoint isn't a live WebSocket target worth probing.
            return Ok(());
        }

        let attacker_origin = ctx.config.attacker_origin.clone();
        let mut probes = vec![(OriginProbe::Attacker, Some(attacker_origin.clone())), (OriginProbe::Null, Some("null".to_string())), (OriginProbe::Missing, None)];
        if let Some(sub) = subdomain_origin(&parsed) {
            probes.push((OriginProbe::Subdomain, Some(sub)));
        }

        for (kind, origin) in probes {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let outcome = tokio::time::timeout(
                ctx.config.timeouts.cswsh_per_origin,
                attempt_handshake(&history.url, origin.as_deref(), &history.ws_messages),
            )
            .await
            .map_err(|_| EngineError::Timeout(ctx.config.timeouts.cswsh_per_origin))??;

            if outcome.accepted {
                let exchanged = outcome.messages_exchanged();
                let poc = self.proof_of_concept(&history.url, origin.as_deref(), &outcome.sent);
                ctx.sink
                    .create(NewIssue {
                        code: IssueCode::WebsocketCswsh,
                        title: "Cross-site WebSocket hijacking".to_string(),
                        detail: format!(
                            "WebSocket endpoint {} accepted a handshake from {} origin `{}`.{}\n\nProof of concept:\n{poc}",
                            history.url,
                            kind.label(),
                            origin.as_deref().unwrap_or("<none>"),
                            if exchanged {
                                format!(" Replayed {} captured message(s), {} answered.", outcome.sent.len(), outcome.received)
                            } else {
                                String::new()
                            }
                        ),
                        confidence: kind.confidence(exchanged),
                        primary_history: history.id,
                        auxiliary_histories: vec![],
                        payload: None,
                        insertion_point_summary: Some(format!("origin:{}", kind.label())),
                        workspace_id: history.workspace_id,
                        task_id: history.task_id,
                        scan_id: history.scan_id,
                        scan_job_id: history.scan_job_id,
                    })
                    .await;

                // Attacker origin accepting is the worst case; anything
                // less permissive is redundant evidence (spec §4.2:
                // "Once attacker origin accepts, lesser tests are
                // skipped").
                if kind == OriginProbe::Attacker {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

impl CswshScan {
    /// Self-contained HTML POC (spec §4.2). When sent-direction messages
    /// were replayed, their literal payloads are embedded as `ws.send(...)`
    /// calls so the POC reproduces the exact exchange observed during the
    /// audit, not just the bare handshake (spec §8 seed scenario 4: "POC
    /// containing the target URL and sent payloads").
    fn proof_of_concept(&self, ws_url: &str, origin: Option<&str>, sent: &[String]) -> String {
        let send_calls = sent
            .iter()
            .map(|payload| format!("    ws.send({});", js_string_literal(payload)))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            r#"<!doctype html><html><body><script>
  const ws = new WebSocket("{ws_url}");
  ws.onopen = () => {{
    console.log("connected from origin {}");
{send_calls}
  }};
  ws.onmessage = (ev) => console.log("received:", ev.data);
</script></body></html>"#,
            origin.unwrap_or("<none>")
        )
    }
}

/// Minimal JS string-literal escaping for embedding a captured payload
/// verbatim in the generated POC.
fn js_string_literal(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_table_matches_spec() {
        assert_eq!(OriginProbe::Attacker.confidence(false), 90);
        assert_eq!(OriginProbe::Null.confidence(false), 85);
        assert_eq!(OriginProbe::Missing.confidence(false), 80);
        assert_eq!(OriginProbe::Subdomain.confidence(false), 75);
    }

    #[test]
    fn message_exchange_adds_five_and_stays_under_100() {
        assert_eq!(OriginProbe::Attacker.confidence(true), 95);
        assert_eq!(OriginProbe::Null.confidence(true), 90);
        assert_eq!(OriginProbe::Missing.confidence(true), 85);
        assert_eq!(OriginProbe::Subdomain.confidence(true), 80);
        // Same-origin is never a finding, exchanged or not.
        assert_eq!(OriginProbe::SameOrigin.confidence(true), 0);
    }

    #[test]
    fn handshake_outcome_exchanged_requires_both_sent_and_received() {
        let sent_no_reply = HandshakeOutcome {
            accepted: true,
            sent: vec!["ping".to_string()],
            received: 0,
        };
        assert!(!sent_no_reply.messages_exchanged());

        let round_trip = HandshakeOutcome {
            accepted: true,
            sent: vec!["ping".to_string()],
            received: 1,
        };
        assert!(round_trip.messages_exchanged());
    }

    #[test]
    fn same_origin_preserves_scheme_and_host() {
        let url = url::Url::parse("ws://t.example/ws").unwrap();
        assert_eq!(same_origin(&url), "ws://t.example");
    }

    #[test]
    fn subdomain_origin_prefixes_host() {
        let url = url::Url::parse("ws://t.example/ws").unwrap();
        assert_eq!(subdomain_origin(&url).unwrap(), "ws://attacker-subdomain.t.example");
    }

    #[test]
    fn proof_of_concept_contains_target_url_and_sent_payloads() {
        let scan = CswshScan;
        let poc = scan.proof_of_concept("wss://t.example/ws", Some("https://cswsh-test.attacker.invalid"), &["{\"op\":\"subscribe\"}".to_string()]);
        assert!(poc.contains("wss://t.example/ws"));
        assert!(poc.contains(r#"ws.send("{\"op\":\"subscribe\"}");"#));
    }
}
