//! Game-server client: the one external interface the core consumes.
//!
//! [`GameClient`] is the seam; the orchestrator only ever talks to the
//! trait. [`HttpGameClient`] is the production adapter for the game's JSON
//! API. Transport failures are retried inside the adapter with the backoff
//! schedule from [`crate::domain::recovery`]; whatever still fails after
//! that surfaces as [`AgentError::Transport`] and the orchestrator decides
//! whether it is fatal.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::circuit::Circuit;
use crate::domain::recovery::{backoff_delay, should_retry};
use crate::domain::types::{EdgeId, GraphSnapshot, PlayerStatus};
use crate::error::AgentError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of player registration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RegisterOutcome {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub initial_budget: u32,
}

/// Generic acknowledgement for write operations without a payload.
#[derive(Clone, Debug, Default)]
pub struct Ack {
    pub ok: bool,
    pub error_reason: Option<String>,
}

/// Server verdict on a claim attempt. `ok == true` is authoritative:
/// the edge is owned and the target node's utility has been credited.
/// Unknown response fields are ignored by construction.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClaimOutcome {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub fidelity_achieved: Option<f64>,
    #[serde(default)]
    pub error_reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: String,
    #[serde(default)]
    pub score: u32,
}

/// Player interface to the game server.
#[async_trait]
pub trait GameClient: Send + Sync {
    async fn register(
        &self,
        player_id: &str,
        name: &str,
        location: &str,
    ) -> Result<RegisterOutcome, AgentError>;

    async fn select_starting_node(&self, node_id: &str) -> Result<Ack, AgentError>;

    async fn restart(&self) -> Result<Ack, AgentError>;

    async fn status(&self) -> Result<PlayerStatus, AgentError>;

    /// Static graph snapshot; cached unless `force` is set.
    async fn graph(&self, force: bool) -> Result<GraphSnapshot, AgentError>;

    async fn claim_edge(
        &self,
        edge: &EdgeId,
        circuit: &Circuit,
        flag_bit: usize,
        num_pairs: u32,
    ) -> Result<ClaimOutcome, AgentError>;

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, AgentError>;
}

// ── Wire envelope ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    ok: Option<bool>,
    data: Option<T>,
    error: Option<WireError>,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    player_id: &'a str,
    name: &'a str,
    location: &'a str,
}

#[derive(Serialize)]
struct SelectStartRequest<'a> {
    player_id: &'a str,
    node_id: &'a str,
}

#[derive(Serialize)]
struct RestartRequest<'a> {
    player_id: &'a str,
}

#[derive(Serialize)]
struct ClaimRequest<'a> {
    player_id: &'a str,
    edge: &'a EdgeId,
    num_bell_pairs: u32,
    circuit: &'a Circuit,
    flag_bit: usize,
}

// ── HTTP adapter ─────────────────────────────────────────────────────────────

/// Production adapter over the game server's JSON API.
pub struct HttpGameClient {
    http: reqwest::Client,
    base_url: String,
    player_id: RwLock<Option<String>>,
    api_token: RwLock<Option<String>>,
    cached_graph: RwLock<Option<GraphSnapshot>>,
}

impl HttpGameClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|error| AgentError::Transport(format!("http client build failed: {error}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            player_id: RwLock::new(None),
            api_token: RwLock::new(None),
            cached_graph: RwLock::new(None),
        })
    }

    /// Pre-seeds credentials, e.g. when resuming a registered player.
    pub fn with_credentials(self, player_id: impl Into<String>, token: impl Into<String>) -> Self {
        *self.player_id.write().expect("player_id lock poisoned") = Some(player_id.into());
        *self.api_token.write().expect("api_token lock poisoned") = Some(token.into());
        self
    }

    fn player_id(&self) -> Result<String, AgentError> {
        self.player_id
            .read()
            .expect("player_id lock poisoned")
            .clone()
            .ok_or_else(|| AgentError::Transport("not registered".to_string()))
    }

    fn bearer_token(&self) -> Option<String> {
        self.api_token.read().expect("api_token lock poisoned").clone()
    }

    async fn send_once(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, AgentError> {
        let response = request
            .send()
            .await
            .map_err(|error| AgentError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Transport(format!("http status {status}")));
        }
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|error| AgentError::Transport(format!("undecodable response: {error}")))
    }

    /// Issues the request, replaying it with backoff on transport failure.
    async fn send_with_retries<F>(&self, build: F) -> Result<serde_json::Value, AgentError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match self.send_once(build()).await {
                Ok(value) => return Ok(value),
                Err(error) if should_retry(attempt) => {
                    let delay = backoff_delay(attempt);
                    warn!(attempt, ?delay, %error, "transport failure, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, AgentError> {
        let url = format!("{}{path}", self.base_url);
        let value = self
            .send_with_retries(|| {
                let mut request = self.http.get(&url);
                if let Some(token) = self.bearer_token() {
                    request = request.bearer_auth(token);
                }
                request
            })
            .await?;
        debug!(path, "get ok");
        let envelope: Envelope<T> = serde_json::from_value(value)
            .map_err(|error| AgentError::Transport(format!("malformed payload: {error}")))?;
        envelope
            .data
            .ok_or_else(|| AgentError::Transport(format!("response for {path} carried no data")))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, AgentError> {
        let url = format!("{}{path}", self.base_url);
        let payload = serde_json::to_value(body)
            .map_err(|error| AgentError::Transport(format!("unencodable request: {error}")))?;
        let value = self
            .send_with_retries(|| {
                let mut request = self.http.post(&url).json(&payload);
                if let Some(token) = self.bearer_token() {
                    request = request.bearer_auth(token);
                }
                request
            })
            .await?;
        debug!(path, "post ok");
        serde_json::from_value(value)
            .map_err(|error| AgentError::Transport(format!("malformed payload: {error}")))
    }
}

fn envelope_ack<T>(envelope: &Envelope<T>) -> Ack {
    Ack {
        ok: envelope.ok.unwrap_or(false),
        error_reason: envelope
            .error
            .as_ref()
            .map(|error| format!("{}: {}", error.code, error.message)),
    }
}

#[async_trait]
impl GameClient for HttpGameClient {
    async fn register(
        &self,
        player_id: &str,
        name: &str,
        location: &str,
    ) -> Result<RegisterOutcome, AgentError> {
        let envelope: Envelope<RegisterOutcome> = self
            .post(
                "/v1/register",
                &RegisterRequest {
                    player_id,
                    name,
                    location,
                },
            )
            .await?;

        let already_registered = envelope
            .error
            .as_ref()
            .is_some_and(|error| error.code == "PLAYER_EXISTS");
        if envelope.ok != Some(true) && !already_registered {
            let ack = envelope_ack(&envelope);
            return Err(AgentError::Transport(format!(
                "registration rejected: {}",
                ack.error_reason.unwrap_or_else(|| "unknown".to_string())
            )));
        }

        *self.player_id.write().expect("player_id lock poisoned") = Some(player_id.to_string());
        let outcome = envelope.data.unwrap_or_default();
        if !outcome.api_token.is_empty() {
            *self.api_token.write().expect("api_token lock poisoned") =
                Some(outcome.api_token.clone());
        }
        Ok(outcome)
    }

    async fn select_starting_node(&self, node_id: &str) -> Result<Ack, AgentError> {
        let player_id = self.player_id()?;
        let envelope: Envelope<serde_json::Value> = self
            .post(
                "/v1/select_starting_node",
                &SelectStartRequest {
                    player_id: &player_id,
                    node_id,
                },
            )
            .await?;
        Ok(envelope_ack(&envelope))
    }

    async fn restart(&self) -> Result<Ack, AgentError> {
        let player_id = self.player_id()?;
        let envelope: Envelope<serde_json::Value> = self
            .post(
                "/v1/restart",
                &RestartRequest {
                    player_id: &player_id,
                },
            )
            .await?;
        Ok(envelope_ack(&envelope))
    }

    async fn status(&self) -> Result<PlayerStatus, AgentError> {
        let player_id = self.player_id()?;
        self.get_data(&format!("/v1/status/{player_id}")).await
    }

    async fn graph(&self, force: bool) -> Result<GraphSnapshot, AgentError> {
        if !force {
            if let Some(graph) = self
                .cached_graph
                .read()
                .expect("graph cache lock poisoned")
                .clone()
            {
                return Ok(graph);
            }
        }
        let graph: GraphSnapshot = self.get_data("/v1/graph").await?;
        *self
            .cached_graph
            .write()
            .expect("graph cache lock poisoned") = Some(graph.clone());
        Ok(graph)
    }

    async fn claim_edge(
        &self,
        edge: &EdgeId,
        circuit: &Circuit,
        flag_bit: usize,
        num_pairs: u32,
    ) -> Result<ClaimOutcome, AgentError> {
        let player_id = self.player_id()?;
        let envelope: Envelope<ClaimOutcome> = self
            .post(
                "/v1/claim_edge",
                &ClaimRequest {
                    player_id: &player_id,
                    edge,
                    num_bell_pairs: num_pairs,
                    circuit,
                    flag_bit,
                },
            )
            .await?;

        let ok = envelope.ok.unwrap_or(false);
        let error_reason = envelope
            .error
            .as_ref()
            .map(|error| format!("{}: {}", error.code, error.message));
        let mut outcome = envelope.data.unwrap_or_default();
        outcome.ok = ok;
        if outcome.error_reason.is_none() {
            outcome.error_reason = error_reason;
        }
        Ok(outcome)
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, AgentError> {
        self.get_data("/v1/leaderboard").await
    }
}
