use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tunnel_common::helpers::normalize_base_url;
use tunnel_common::{
    ActionRequest, ActionResponse, Error, ErrorResponse, KeyExchangeRequest, KeyExchangeResponse,
    Result, ACTION_PATH, KEY_EXCHANGE_PATH,
};

/// The two protocol calls a client makes.
///
/// A server rejection of the session surfaces as [`Error::Auth`]; network
/// failures and timeouts as [`Error::Transport`] / [`Error::Timeout`].
pub trait Transport: Send + Sync {
    fn key_exchange(
        &self,
        req: &KeyExchangeRequest,
    ) -> impl Future<Output = Result<KeyExchangeResponse>> + Send;

    fn action(&self, req: &ActionRequest) -> impl Future<Output = Result<ActionResponse>> + Send;
}

/// Form-encoded POSTs over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Every call is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_form<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: serde::Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .post(&url)
            .form(body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = res.status();
        if status.is_success() {
            return res
                .json::<R>()
                .await
                .map_err(|e| Error::serialization(format!("failed to parse server response: {e}")));
        }

        let message = match res.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        Err(status_error(status, message))
    }
}

fn map_send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout(err)
    } else {
        Error::transport(err)
    }
}

fn status_error(status: StatusCode, message: String) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::Auth(message),
        s if s.is_client_error() => Error::Input(message),
        _ => Error::Internal(format!("server returned {status}: {message}")),
    }
}

impl Transport for HttpTransport {
    async fn key_exchange(&self, req: &KeyExchangeRequest) -> Result<KeyExchangeResponse> {
        self.post_form(KEY_EXCHANGE_PATH, req).await
    }

    async fn action(&self, req: &ActionRequest) -> Result<ActionResponse> {
        self.post_form(ACTION_PATH, req).await
    }
}
