use super::error::SessionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8086;
pub const DEFAULT_AUDIO_BITRATE: u32 = 128_000;
pub const DEFAULT_VIDEO_BITRATE: u32 = 3_000_000;
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_RECONNECTION_DELAY_MAX_MS: u64 = 10_000;
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 30_000;

/// Options handed through to the transport layer.
///
/// Every field is optional so that caller values can be layered over the
/// defaults key by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct TransportOptions {
    /// Upper bound for the delay between reconnection attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnection_delay_max_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_timeout_ms: Option<u64>,

    /// Give up reconnecting after this many attempts (unbounded when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnects: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Subject namespace used by subject-based transports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_prefix: Option<String>,
}

impl TransportOptions {
    /// Layer `self` over `defaults`: any key set on `self` wins.
    pub fn merged_over(self, defaults: TransportOptions) -> Self {
        Self {
            reconnection_delay_max_ms: self
                .reconnection_delay_max_ms
                .or(defaults.reconnection_delay_max_ms),
            connection_timeout_ms: self.connection_timeout_ms.or(defaults.connection_timeout_ms),
            max_reconnects: self.max_reconnects.or(defaults.max_reconnects),
            client_name: self.client_name.or(defaults.client_name),
            subject_prefix: self.subject_prefix.or(defaults.subject_prefix),
        }
    }

    pub fn reconnection_delay_max(&self) -> Duration {
        Duration::from_millis(
            self.reconnection_delay_max_ms
                .unwrap_or(DEFAULT_RECONNECTION_DELAY_MAX_MS),
        )
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout_ms.map(Duration::from_millis)
    }

    fn defaults() -> Self {
        Self {
            reconnection_delay_max_ms: Some(DEFAULT_RECONNECTION_DELAY_MAX_MS),
            ..Default::default()
        }
    }
}

/// Caller-supplied session options. Anything left unset is filled in by
/// [`SessionOptions::normalize`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionOptions {
    /// Identifies the session on the transport (default: `session-<uuid>`)
    pub session_id: Option<String>,

    /// Remote endpoint host, e.g. "example.com" or "http://relay.local/"
    pub host: Option<String>,

    /// Use the secure socket scheme
    #[serde(default)]
    pub https: bool,

    pub port: Option<u16>,

    #[serde(default)]
    pub transport: TransportOptions,

    pub audio_bitrate: Option<u32>,
    pub video_bitrate: Option<u32>,

    /// Derived from the audio bitrate when unset
    pub audio_sample_rate: Option<u32>,

    pub frame_rate: Option<u32>,

    /// How long start/stop wait for the remote to acknowledge.
    /// Default: 30000. Zero waits indefinitely.
    pub ack_timeout_ms: Option<u64>,
}

impl SessionOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Default::default()
        }
    }

    /// Validate the options and fill in defaults, producing the configuration
    /// the controller runs with.
    pub fn normalize(self) -> Result<SessionConfig, SessionError> {
        let raw_host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SessionError::configuration("host is required"))?;

        let host = normalize_host(raw_host, self.https);
        if host.ends_with("://") {
            return Err(SessionError::configuration(format!(
                "host '{}' has no address after the scheme",
                raw_host
            )));
        }

        let session_id = match self.session_id {
            Some(id) => {
                validate_session_id(&id)?;
                id
            }
            None => format!("session-{}", uuid::Uuid::new_v4()),
        };

        let audio_bitrate = self.audio_bitrate.unwrap_or(DEFAULT_AUDIO_BITRATE);

        Ok(SessionConfig {
            session_id,
            host,
            https: self.https,
            port: self.port.unwrap_or(DEFAULT_PORT),
            transport: self.transport.merged_over(TransportOptions::defaults()),
            audio_bitrate,
            video_bitrate: self.video_bitrate.unwrap_or(DEFAULT_VIDEO_BITRATE),
            audio_sample_rate: self.audio_sample_rate.unwrap_or(audio_bitrate / 4),
            frame_rate: self.frame_rate.unwrap_or(DEFAULT_FRAME_RATE),
            ack_timeout: match self.ack_timeout_ms.unwrap_or(DEFAULT_ACK_TIMEOUT_MS) {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        })
    }
}

/// Fully resolved session configuration. Immutable once built.
///
/// Serializes to the payload of the remote `start` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub session_id: String,

    /// Normalized host, always carrying a socket scheme
    pub host: String,

    pub https: bool,
    pub port: u16,
    pub transport: TransportOptions,

    #[serde(rename = "audioBitsPerSecond")]
    pub audio_bitrate: u32,

    #[serde(rename = "videoBitsPerSecond")]
    pub video_bitrate: u32,

    pub audio_sample_rate: u32,

    #[serde(rename = "framerate")]
    pub frame_rate: u32,

    /// None waits for acknowledgements indefinitely
    #[serde(skip)]
    pub ack_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Address the transport connects to: normalized host and port.
    pub fn connection_target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Normalize a remote host into a socket URL prefix.
///
/// Exactly one trailing `/` is removed. A web scheme (`http://`, `https://`)
/// is rewritten to `wss://` when `https` is set and `ws://` otherwise; a host
/// without a scheme gets the same prefix. Socket schemes are kept as given.
pub fn normalize_host(host: &str, https: bool) -> String {
    let host = host.strip_suffix('/').unwrap_or(host);
    let socket_scheme = if https { "wss://" } else { "ws://" };

    if host.starts_with("ws://") || host.starts_with("wss://") {
        return host.to_string();
    }

    let rest = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);

    format!("{}{}", socket_scheme, rest)
}

fn validate_session_id(id: &str) -> Result<(), SessionError> {
    if id.is_empty() {
        return Err(SessionError::configuration("session_id must not be empty"));
    }

    if let Some(c) = id
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '.' | '*' | '>'))
    {
        return Err(SessionError::configuration(format!(
            "session_id '{}' contains invalid character {:?}",
            id, c
        )));
    }

    Ok(())
}
