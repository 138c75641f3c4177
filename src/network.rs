use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::listen::Listen;
use crate::transport::Transport;

const CLIENT_NAME: &str = "legacy";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "1.2";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Session credentials returned by a successful handshake.
#[derive(Debug, Clone)]
struct Session {
  id: String,
  nowplaying_url: String,
  scrobble_url: String,
}

/// Audioscrobbler 1.2 protocol codec and request orchestrator.
///
/// Builds authenticated handshake requests, encodes nowplaying/scrobble
/// bodies, parses the server's textual responses, and maps every outcome
/// to [`Error`]. Stateful only in holding the session credentials
/// produced by a successful handshake; delegates the HTTP exchange itself
/// to an injected [`Transport`].
pub struct Network {
  username: String,
  password_md5_hex: String,
  handshake_url: String,
  session: Option<Session>,
  transport: Arc<dyn Transport>,
}

impl Network {
  pub(crate) fn new(
    username: impl Into<String>,
    password_md5_hex: impl Into<String>,
    handshake_url: impl Into<String>,
    transport: Arc<dyn Transport>,
  ) -> Self {
    Self {
      username: username.into(),
      password_md5_hex: password_md5_hex.into(),
      handshake_url: handshake_url.into(),
      session: None,
      transport,
    }
  }

  pub(crate) fn has_session(&self) -> bool {
    self.session.is_some()
  }

  pub(crate) fn clear_session(&mut self) {
    self.session = None;
  }

  /// Performs the authenticated handshake. On success, stores the session
  /// id and the nowplaying/scrobble URLs the server returned.
  pub(crate) async fn handshake(&mut self) -> Result<()> {
    let timestamp = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .expect("system clock is before unix epoch")
      .as_secs()
      .to_string();

    let auth = format!(
      "{:x}",
      md5::compute(format!("{}{}", self.password_md5_hex, timestamp))
    );

    let mut params = BTreeMap::new();
    params.insert("hs", "true".to_string());
    params.insert("p", PROTOCOL_VERSION.to_string());
    params.insert("c", CLIENT_NAME.to_string());
    params.insert("v", CLIENT_VERSION.to_string());
    params.insert("u", self.username.clone());
    params.insert("t", timestamp);
    params.insert("a", auth);

    let (status, body) = self
      .transport
      .get(&self.handshake_url, &params, HTTP_TIMEOUT)
      .await
      .map_err(|e| Error::RequestsError(e.0))?;

    if !(200..300).contains(&status) {
      return Err(Error::HardFailure(format!("status {status}")));
    }

    self.process_handshake_response(&body)
  }

  fn process_handshake_response(&mut self, body: &str) -> Result<()> {
    let lines: Vec<&str> = body.split('\n').collect();
    match lines.first().copied() {
      Some("OK") if lines.len() >= 4 => {
        self.session = Some(Session {
          id: lines[1].to_string(),
          nowplaying_url: lines[2].to_string(),
          scrobble_url: lines[3].to_string(),
        });
        Ok(())
      }
      Some("BANNED") => Err(Error::ClientBanned),
      Some("BADAUTH") => Err(Error::BadAuth),
      Some("BADTIME") => Err(Error::BadTime),
      _ => Err(Error::HardFailure(body.to_string())),
    }
  }

  /// Sends a nowplaying notification for a single listen.
  pub(crate) async fn nowplaying(&mut self, listen: &Listen) -> Result<()> {
    let Some(session) = self.session.clone() else {
      return Err(Error::BadSession("no session".to_string()));
    };

    let mut params: BTreeMap<String, String> = listen
      .nowplaying_params()
      .into_iter()
      .map(|(k, v)| (k.to_string(), v))
      .collect();
    params.insert("s".to_string(), session.id.clone());

    self.post(&session.nowplaying_url, params).await
  }

  /// Submits a batch of scrobbles. `listens` must be non-empty.
  pub(crate) async fn scrobble(&mut self, listens: &[Listen]) -> Result<()> {
    let Some(session) = self.session.clone() else {
      return Err(Error::BadSession("no session".to_string()));
    };
    if listens.is_empty() {
      return Err(Error::SubmissionWithoutListens);
    }

    let mut params = BTreeMap::new();
    for (i, listen) in listens.iter().enumerate() {
      params.extend(listen.scrobble_params(i));
    }
    params.insert("s".to_string(), session.id.clone());

    self.post(&session.scrobble_url, params).await
  }

  async fn post(&mut self, url: &str, params: BTreeMap<String, String>) -> Result<()> {
    let (status, body) = self
      .transport
      .post(url, &params, HTTP_TIMEOUT)
      .await
      .map_err(|e| Error::RequestsError(e.0))?;

    if !(200..300).contains(&status) {
      return Err(Error::HardFailure(format!("status {status}")));
    }

    self.process_post_response(&body)
  }

  fn process_post_response(&mut self, body: &str) -> Result<()> {
    if body.starts_with("OK") {
      Ok(())
    } else if body.starts_with("BADSESSION") {
      Err(Error::BadSession(
        "server rejected session".to_string(),
      ))
    } else {
      Err(Error::HardFailure(body.to_string()))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transport::TransportError;
  use async_trait::async_trait;
  use chrono::Utc;
  use std::sync::Mutex;

  struct ScriptedTransport {
    get_responses: Mutex<Vec<Result<(u16, String), TransportError>>>,
    post_responses: Mutex<Vec<Result<(u16, String), TransportError>>>,
  }

  impl ScriptedTransport {
    fn new(
      get_responses: Vec<Result<(u16, String), TransportError>>,
      post_responses: Vec<Result<(u16, String), TransportError>>,
    ) -> Self {
      Self {
        get_responses: Mutex::new(get_responses),
        post_responses: Mutex::new(post_responses),
      }
    }
  }

  #[async_trait]
  impl Transport for ScriptedTransport {
    async fn get(
      &self,
      _url: &str,
      _query: &BTreeMap<&'static str, String>,
      _timeout: Duration,
    ) -> Result<(u16, String), TransportError> {
      self.get_responses.lock().unwrap().remove(0)
    }

    async fn post(
      &self,
      _url: &str,
      _form: &BTreeMap<String, String>,
      _timeout: Duration,
    ) -> Result<(u16, String), TransportError> {
      self.post_responses.lock().unwrap().remove(0)
    }
  }

  fn network_with(transport: ScriptedTransport) -> Network {
    Network::new(
      "user",
      "3858f62230ac3c915f300c664312c63f",
      "https://example.com/handshake",
      Arc::new(transport),
    )
  }

  #[tokio::test]
  async fn handshake_success_stores_session() {
    let transport = ScriptedTransport::new(
      vec![Ok((200, "OK\nSID\nhttps://np\nhttps://sub\n".to_string()))],
      vec![],
    );
    let mut net = network_with(transport);
    net.handshake().await.unwrap();
    assert!(net.has_session());
  }

  #[tokio::test]
  async fn handshake_banned_is_fatal() {
    let transport = ScriptedTransport::new(vec![Ok((200, "BANNED".to_string()))], vec![]);
    let mut net = network_with(transport);
    assert!(matches!(net.handshake().await, Err(Error::ClientBanned)));
  }

  #[tokio::test]
  async fn handshake_badauth_is_fatal() {
    let transport = ScriptedTransport::new(vec![Ok((200, "BADAUTH".to_string()))], vec![]);
    let mut net = network_with(transport);
    assert!(matches!(net.handshake().await, Err(Error::BadAuth)));
  }

  #[tokio::test]
  async fn handshake_badtime_is_fatal() {
    let transport = ScriptedTransport::new(vec![Ok((200, "BADTIME".to_string()))], vec![]);
    let mut net = network_with(transport);
    assert!(matches!(net.handshake().await, Err(Error::BadTime)));
  }

  #[tokio::test]
  async fn handshake_unknown_body_is_hard_failure() {
    let transport = ScriptedTransport::new(vec![Ok((200, "FAILED eek".to_string()))], vec![]);
    let mut net = network_with(transport);
    assert!(matches!(net.handshake().await, Err(Error::HardFailure(_))));
  }

  #[tokio::test]
  async fn handshake_non_2xx_is_hard_failure() {
    let transport = ScriptedTransport::new(vec![Ok((500, "oops".to_string()))], vec![]);
    let mut net = network_with(transport);
    assert!(matches!(net.handshake().await, Err(Error::HardFailure(_))));
  }

  #[tokio::test]
  async fn handshake_transport_failure_is_requests_error() {
    let transport =
      ScriptedTransport::new(vec![Err(TransportError("timed out".to_string()))], vec![]);
    let mut net = network_with(transport);
    assert!(matches!(net.handshake().await, Err(Error::RequestsError(_))));
  }

  #[tokio::test]
  async fn nowplaying_without_session_is_bad_session() {
    let transport = ScriptedTransport::new(vec![], vec![]);
    let mut net = network_with(transport);
    let listen = Listen::new(Utc::now(), "Artist", "Track");
    assert!(matches!(
      net.nowplaying(&listen).await,
      Err(Error::BadSession(_))
    ));
  }

  #[tokio::test]
  async fn scrobble_without_listens_is_submission_without_listens() {
    let transport = ScriptedTransport::new(
      vec![Ok((200, "OK\nSID\nhttps://np\nhttps://sub\n".to_string()))],
      vec![],
    );
    let mut net = network_with(transport);
    net.handshake().await.unwrap();
    assert!(matches!(
      net.scrobble(&[]).await,
      Err(Error::SubmissionWithoutListens)
    ));
  }

  #[tokio::test]
  async fn scrobble_badsession_clears_nothing_itself_but_signals_caller() {
    let transport = ScriptedTransport::new(
      vec![Ok((200, "OK\nSID\nhttps://np\nhttps://sub\n".to_string()))],
      vec![Ok((200, "BADSESSION\n".to_string()))],
    );
    let mut net = network_with(transport);
    net.handshake().await.unwrap();
    let listen = Listen::new(Utc::now(), "Artist", "Track");
    let result = net.scrobble(std::slice::from_ref(&listen)).await;
    assert!(matches!(result, Err(Error::BadSession(_))));
    // Network itself doesn't clear session; that's the Scrobbler's job.
    assert!(net.has_session());
  }

  #[tokio::test]
  async fn scrobble_success() {
    let transport = ScriptedTransport::new(
      vec![Ok((200, "OK\nSID\nhttps://np\nhttps://sub\n".to_string()))],
      vec![Ok((200, "OK\n".to_string()))],
    );
    let mut net = network_with(transport);
    net.handshake().await.unwrap();
    let listen = Listen::new(Utc::now(), "Artist", "Track");
    net.scrobble(std::slice::from_ref(&listen)).await.unwrap();
  }
}
