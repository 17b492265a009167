//! Channel authentication against the application's auth endpoint.

use std::time::Duration;

use pusher_client_core::logging::targets;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{PusherError, Result};
use crate::options::PusherAuth;
use crate::protocol::{AuthRequest, AuthResponse};

/// Default timeout for a single auth round trip.
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Signs private and presence subscriptions by POSTing to the auth endpoint.
#[derive(Clone, Debug)]
pub(crate) struct Authorizer {
    client: reqwest::Client,
    auth: Option<PusherAuth>,
    headers: HeaderMap,
}

impl Authorizer {
    /// Build an authorizer. Header names and values are validated here.
    pub(crate) fn new(auth: Option<PusherAuth>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(auth) = &auth {
            for (name, value) in &auth.headers {
                headers.insert(
                    HeaderName::try_from(name.as_str())?,
                    HeaderValue::try_from(value.as_str())?,
                );
            }
        }

        let client = reqwest::Client::builder()
            .timeout(AUTH_TIMEOUT)
            .user_agent(format!("pusher-client-rust/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            auth,
            headers,
        })
    }

    /// Request a signature for `channel_name` on `socket_id`.
    pub(crate) async fn authorize(&self, channel_name: &str, socket_id: &str) -> Result<AuthResponse> {
        let auth = self.auth.as_ref().ok_or_else(|| {
            PusherError::auth(format!(
                "channel '{channel_name}' requires authentication but no auth endpoint is configured"
            ))
        })?;

        tracing::debug!(target: targets::AUTH, channel = channel_name, socket_id, endpoint = %auth.endpoint, "authenticating channel");

        let body = AuthRequest {
            channel_name: channel_name.to_string(),
            socket_id: socket_id.to_string(),
        };
        let response = self
            .client
            .post(&auth.endpoint)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(target: targets::AUTH, channel = channel_name, status = status.as_u16(), "auth endpoint rejected subscription");
            return Err(PusherError::Authentication {
                status: Some(status.as_u16()),
                message,
            });
        }

        let auth: AuthResponse = response.json().await.map_err(|e| PusherError::Authentication {
            status: Some(status.as_u16()),
            message: format!("invalid auth response: {e}"),
        })?;
        Ok(auth)
    }
}
