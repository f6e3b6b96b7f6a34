use crate::error::FritzError;
use log::{debug, info, warn};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

/// Cached router session. An empty SID or one consisting entirely of '0'
/// means "not authenticated".
#[derive(Debug, Clone)]
pub struct Session {
    pub sid: String,
}

/// Raw shape of the login_sid.lua XML response.
#[derive(Debug, Default, Deserialize)]
struct SessionInfoXml {
    #[serde(rename = "SID", default)]
    sid: String,
    #[serde(rename = "Challenge", default)]
    challenge: String,
    #[serde(rename = "BlockTime", default)]
    block_time: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct LoginInfo {
    pub sid: String,
    pub challenge: String,
    pub block_time: u64,
}

/// Parses the login XML leniently: malformed XML or unparseable fields become
/// empty/zero values instead of an error. Whether the attempt failed is decided
/// from the SID and challenge, not from XML well-formedness.
pub(crate) fn parse_login_xml(xml: &str) -> LoginInfo {
    let raw: SessionInfoXml = quick_xml::de::from_str(xml).unwrap_or_default();
    LoginInfo {
        sid: raw.sid,
        challenge: raw.challenge,
        block_time: raw.block_time.trim().parse().unwrap_or(0),
    }
}

pub(crate) fn is_valid_sid(sid: &str) -> bool {
    !sid.is_empty() && !sid.chars().all(|ch| ch == '0')
}

/// The router's legacy hashing only covers Latin-1; anything above U+00FF is
/// replaced with '.' before hashing.
pub(crate) fn sanitize_password(password: &str) -> String {
    password
        .chars()
        .map(|ch| if (ch as u32) <= 0xFF { ch } else { '.' })
        .collect()
}

/// Computes the challenge-response token. The router hashes the UTF-16LE bytes
/// of "<challenge>-<password>" (no BOM); any other encoding is silently
/// rejected as a wrong password, so this must be reproduced exactly.
pub(crate) fn challenge_response(challenge: &str, password: &str) -> String {
    let seed = format!("{}-{}", challenge, sanitize_password(password));
    let mut bytes = Vec::with_capacity(seed.len() * 2);
    for unit in seed.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    format!("{}-{:x}", challenge, md5::compute(&bytes))
}

/// Seconds to hold off after a blocked login: BlockTime plus one, saturating
/// so a bogus huge BlockTime cannot overflow.
fn block_wait_secs(block_time: u64) -> u64 {
    block_time.saturating_add(1)
}

/// HTTP client for one Fritz!Box, owning the credentials and the cached
/// session. Not meant to be shared: exactly one poller drives one client.
pub struct FritzClient {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: String,
    username: String,
    password: String,
    session: Option<Session>,
}

impl FritzClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, FritzError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            session: None,
        })
    }

    /// Performs the two-step challenge-response login and caches the SID.
    pub async fn login(&mut self) -> Result<String, FritzError> {
        let url = format!("{}/login_sid.lua", self.base_url);
        debug!("Requesting login challenge from {}", url);
        let body = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let info = parse_login_xml(&body);

        if info.block_time > 0 {
            // The router is rate-limiting login attempts. Wait it out, this is
            // a backoff rather than a retry.
            let wait_secs = block_wait_secs(info.block_time);
            warn!("Login blocked by router, waiting {} seconds", wait_secs);
            sleep(Duration::from_secs(wait_secs)).await;
        }

        if is_valid_sid(&info.sid) {
            // Some configurations hand out a session on the first request.
            self.session = Some(Session {
                sid: info.sid.clone(),
            });
            return Ok(info.sid);
        }

        if info.challenge.is_empty() {
            return Err(FritzError::Auth("missing login challenge".to_string()));
        }

        let response = challenge_response(&info.challenge, &self.password);
        let body = self
            .http
            .get(&url)
            .query(&[
                ("response", response.as_str()),
                ("username", self.username.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let info = parse_login_xml(&body);
        if !is_valid_sid(&info.sid) {
            return Err(FritzError::Auth("login failed (SID is zero)".to_string()));
        }

        info!("Logged in to {}", self.base_url);
        self.session = Some(Session {
            sid: info.sid.clone(),
        });
        Ok(info.sid)
    }

    /// Returns the cached SID if still present, logging in otherwise. Staleness
    /// is only ever detected by a failed fetch, there is no expiry tracking.
    pub async fn ensure_login(&mut self) -> Result<String, FritzError> {
        if let Some(session) = &self.session {
            if is_valid_sid(&session.sid) {
                return Ok(session.sid.clone());
            }
        }
        self.login().await
    }

    /// Drops the cached session so the next `ensure_login` performs a fresh login.
    pub fn invalidate_session(&mut self) {
        self.session = None;
    }
}
