//! REST negotiate flow that resolves a hub's WebSocket URL.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConnectionError;
use crate::types::HubKind;

/// Outcome of a successful negotiate: the full WebSocket URL plus the
/// connection-scoped access token embedded in it.
#[derive(Debug, Clone)]
pub struct NegotiatedSocket {
    pub ws_url: String,
    pub access_token: String,
}

/// Resolves the WebSocket endpoint for a hub before each connection
/// attempt.
#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn negotiate(
        &self,
        hub: HubKind,
        bearer: &str,
    ) -> Result<NegotiatedSocket, ConnectionError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubNegotiateResponse {
    url: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionNegotiateResponse {
    connection_id: Option<String>,
}

/// Two-step negotiate against the automation service.
///
/// Step one asks `{base}/{hub}/negotiate` (with the hub bearer token)
/// for the socket endpoint and a connection-scoped access token. Step
/// two posts to that endpoint's own negotiate URL for a connection id.
/// The final URL carries the id and access token as query parameters.
pub struct RestNegotiator {
    http: reqwest::Client,
    base_url: String,
}

impl RestNegotiator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Negotiator for RestNegotiator {
    async fn negotiate(
        &self,
        hub: HubKind,
        bearer: &str,
    ) -> Result<NegotiatedSocket, ConnectionError> {
        let hub_url = format!(
            "{}/{}/negotiate",
            self.base_url.trim_end_matches('/'),
            hub.hub_path()
        );
        debug!(hub = %hub, url = %hub_url, "negotiating hub endpoint");

        let first: HubNegotiateResponse = self
            .http
            .post(&hub_url)
            .bearer_auth(bearer)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let url = first.url.ok_or(ConnectionError::NegotiateMissing("url"))?;
        let access_token = first
            .access_token
            .ok_or(ConnectionError::NegotiateMissing("accessToken"))?;

        // The endpoint URL carries its own query string; the connection
        // negotiate goes to `{path}negotiate?{query}`.
        let conn_url = match url.split_once('?') {
            Some((path, query)) => format!("{path}negotiate?{query}"),
            None => format!("{url}negotiate"),
        };
        let second: ConnectionNegotiateResponse = self
            .http
            .post(&conn_url)
            .bearer_auth(&access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let connection_id = second
            .connection_id
            .ok_or(ConnectionError::NegotiateMissing("connectionId"))?;

        let ws_url = to_ws_scheme(&format!(
            "{url}&id={connection_id}&access_token={access_token}"
        ));
        debug!(hub = %hub, "negotiate complete");

        Ok(NegotiatedSocket {
            ws_url,
            access_token,
        })
    }
}

fn to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_owned()
    }
}
