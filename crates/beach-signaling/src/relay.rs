use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::RelayError;

/// The intermediary store: put a message for a peer, get the pending message
/// for a peer. Neither operation retries.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn publish(&self, peer_id: &str, body: Bytes) -> Result<(), RelayError>;

    /// `Ok(None)` means nothing is pending for `peer_id`, the normal idle
    /// outcome.
    async fn fetch(&self, peer_id: &str) -> Result<Option<Bytes>, RelayError>;
}

/// Relay reached over HTTP: `POST <base>/data/<peer>` and `GET <base>/data/<peer>`.
#[derive(Clone)]
pub struct HttpRelay {
    client: Client,
    base: Url,
}

impl HttpRelay {
    pub fn new(base: Url, request_timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(http_error)?;
        Ok(Self::with_client(client, base))
    }

    pub fn with_client(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, peer_id: &str) -> Result<Url, RelayError> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                RelayError::Request(format!("relay address {} cannot carry a path", self.base))
            })?;
            segments.pop_if_empty();
            segments.push("data");
            segments.push(peer_id);
        }
        Ok(url)
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn publish(&self, peer_id: &str, body: Bytes) -> Result<(), RelayError> {
        let url = self.endpoint(peer_id)?;
        tracing::trace!(
            target = "beach_signaling::relay",
            phase = "publish",
            peer = peer_id,
            await = "client.send",
            state = "start"
        );
        let send_attempt = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;
        tracing::trace!(
            target = "beach_signaling::relay",
            phase = "publish",
            peer = peer_id,
            await = "client.send",
            state = "end",
            result = ?send_attempt.as_ref().map(reqwest::Response::status)
        );
        let response = send_attempt.map_err(http_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn fetch(&self, peer_id: &str) -> Result<Option<Bytes>, RelayError> {
        let url = self.endpoint(peer_id)?;
        tracing::trace!(
            target = "beach_signaling::relay",
            phase = "fetch",
            peer = peer_id,
            await = "client.send",
            state = "start"
        );
        let send_attempt = self.client.get(url).send().await;
        tracing::trace!(
            target = "beach_signaling::relay",
            phase = "fetch",
            peer = peer_id,
            await = "client.send",
            state = "end",
            result = ?send_attempt.as_ref().map(reqwest::Response::status)
        );
        let response = send_attempt.map_err(http_error)?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await.map_err(http_error)?;
                if body.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(body))
                }
            }
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            _ => Err(status_error(response).await),
        }
    }
}

async fn status_error(response: reqwest::Response) -> RelayError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let reason = if text.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        text.trim().to_string()
    };
    RelayError::Status {
        status: status.as_u16(),
        reason,
    }
}

fn http_error(err: reqwest::Error) -> RelayError {
    RelayError::Request(err.to_string())
}

/// In-process relay with one FIFO slot per peer id. Used for loopback
/// sessions and tests; failures can be injected with [`MemoryRelay::fail_with`].
#[derive(Debug, Default)]
pub struct MemoryRelay {
    slots: Mutex<HashMap<String, VecDeque<Bytes>>>,
    failure: Mutex<Option<RelayError>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call fails with `err` until [`MemoryRelay::recover`].
    pub fn fail_with(&self, err: RelayError) {
        *self.failure.lock() = Some(err);
    }

    pub fn recover(&self) {
        self.failure.lock().take();
    }

    pub fn pending(&self, peer_id: &str) -> usize {
        self.slots.lock().get(peer_id).map_or(0, VecDeque::len)
    }

    fn injected_failure(&self) -> Result<(), RelayError> {
        match self.failure.lock().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn publish(&self, peer_id: &str, body: Bytes) -> Result<(), RelayError> {
        self.injected_failure()?;
        self.slots
            .lock()
            .entry(peer_id.to_string())
            .or_default()
            .push_back(body);
        Ok(())
    }

    async fn fetch(&self, peer_id: &str) -> Result<Option<Bytes>, RelayError> {
        self.injected_failure()?;
        Ok(self
            .slots
            .lock()
            .get_mut(peer_id)
            .and_then(VecDeque::pop_front))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_data_segment() {
        let base = Url::parse("http://relay.local:3000/").expect("url");
        let relay = HttpRelay::with_client(Client::new(), base);
        assert_eq!(
            relay.endpoint("peer-b").expect("endpoint").as_str(),
            "http://relay.local:3000/data/peer-b"
        );

        let nested = Url::parse("https://relay.local/dss").expect("url");
        let relay = HttpRelay::with_client(Client::new(), nested);
        assert_eq!(
            relay.endpoint("a b").expect("endpoint").as_str(),
            "https://relay.local/dss/data/a%20b"
        );
    }

    #[tokio::test]
    async fn memory_relay_is_fifo_per_peer() {
        let relay = MemoryRelay::new();
        relay
            .publish("b", Bytes::from_static(b"first"))
            .await
            .expect("publish");
        relay
            .publish("b", Bytes::from_static(b"second"))
            .await
            .expect("publish");
        assert_eq!(relay.pending("b"), 2);
        assert_eq!(relay.fetch("a").await.expect("fetch"), None);
        assert_eq!(
            relay.fetch("b").await.expect("fetch"),
            Some(Bytes::from_static(b"first"))
        );
        assert_eq!(
            relay.fetch("b").await.expect("fetch"),
            Some(Bytes::from_static(b"second"))
        );
        assert_eq!(relay.fetch("b").await.expect("fetch"), None);
    }

    #[tokio::test]
    async fn memory_relay_injected_failures() {
        let relay = MemoryRelay::new();
        relay.fail_with(RelayError::Unavailable("down".into()));
        assert_eq!(
            relay.fetch("a").await,
            Err(RelayError::Unavailable("down".into()))
        );
        assert!(relay.publish("a", Bytes::from_static(b"x")).await.is_err());
        relay.recover();
        assert_eq!(relay.fetch("a").await, Ok(None));
    }
}
