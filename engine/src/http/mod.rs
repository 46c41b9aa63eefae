//! # http
//!
//! The HTTP Execution component (spec §4.1): builds a request from
//! captured history, executes it with the chosen transport, and records
//! the response as a `History`.

pub mod execute;
pub mod transport;

pub use execute::{execute, ExecuteOptions, ExecuteResult, HistoryCreationOptions, RedirectPolicy, Request};
pub use transport::Transport;

use crate::error::EngineResult;

/// Owns the pair of clients every audit needs: one that follows
/// redirects (the default for every audit) and one that does not (the
/// open-redirect audit's dedicated client, spec §4.1). Audits never
/// construct a `reqwest::Client` themselves — they go through this.
#[derive(Clone)]
pub struct HttpExecutor {
    following: reqwest::Client,
    non_following: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(transport: Transport, accept_invalid_certs: bool) -> EngineResult<Self> {
        Ok(Self {
            following: transport::build_client(transport, accept_invalid_certs, true)?,
            non_following: transport::build_client(transport, accept_invalid_certs, false)?,
        })
    }

    /// Executes `request` per `options`, choosing the redirect-following
    /// or non-following client based on `options.redirects`.
    pub async fn execute(&self, request: &Request, options: &ExecuteOptions) -> ExecuteResult {
        let client = match options.redirects {
            RedirectPolicy::Follow => &self.following,
            RedirectPolicy::DoNotFollow => &self.non_following,
        };
        execute::execute(client, request, options).await
    }

    /// Raw access for callers that already hold a client override (spec
    /// §4.2 audit-options: "HTTP client override").
    pub fn following_client(&self) -> &reqwest::Client {
        &self.following
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn executor_builds_both_clients() {
        let exec = HttpExecutor::new(Transport::Http1, true).unwrap();
        assert!(std::ptr::eq(exec.following_client(), &exec.following));
    }
}
