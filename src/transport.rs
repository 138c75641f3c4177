use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Error raised by a [`Transport`] implementation when an HTTP exchange
/// cannot be completed at all (connection failure, timeout, TLS error).
/// Distinct from a successfully-received non-2xx response, which a
/// `Transport` reports as an `Ok((status, body))` pair for `Network` to
/// classify.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct TransportError(pub String);

/// The HTTP executor the core delegates to. Abstracted behind this trait
/// so the Audioscrobbler state machine never touches `reqwest` directly
/// and can be driven deterministically in tests.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn get(
    &self,
    url: &str,
    query: &BTreeMap<&'static str, String>,
    timeout: Duration,
  ) -> Result<(u16, String), TransportError>;

  async fn post(
    &self,
    url: &str,
    form: &BTreeMap<String, String>,
    timeout: Duration,
  ) -> Result<(u16, String), TransportError>;
}

/// Production [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
    }
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn get(
    &self,
    url: &str,
    query: &BTreeMap<&'static str, String>,
    timeout: Duration,
  ) -> Result<(u16, String), TransportError> {
    let resp = self
      .client
      .get(url)
      .query(query)
      .timeout(timeout)
      .send()
      .await
      .map_err(|e| TransportError(e.to_string()))?;
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(|e| TransportError(e.to_string()))?;
    Ok((status, body))
  }

  async fn post(
    &self,
    url: &str,
    form: &BTreeMap<String, String>,
    timeout: Duration,
  ) -> Result<(u16, String), TransportError> {
    let resp = self
      .client
      .post(url)
      .form(form)
      .timeout(timeout)
      .send()
      .await
      .map_err(|e| TransportError(e.to_string()))?;
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(|e| TransportError(e.to_string()))?;
    Ok((status, body))
  }
}
