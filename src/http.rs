use anyhow::Context as _;
use http::header::{self, HeaderMap, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("globus-cli/", env!("CARGO_PKG_VERSION"));

/// A query string, built up from the optional flags of a command
pub type Query = Vec<(&'static str, String)>;

/// Adds `key=value` to the query if the flag was given
pub fn push_opt<T: ToString>(query: &mut Query, key: &'static str, value: Option<T>) {
    if let Some(value) = value {
        query.push((key, value.to_string()));
    }
}

/// Adds `key=a,b,c` to the query if any values were given
pub fn push_list<T: ToString>(query: &mut Query, key: &'static str, values: &[T]) {
    if !values.is_empty() {
        let joined = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        query.push((key, joined));
    }
}

/// An error response from one of the services
#[derive(Debug, thiserror::Error)]
#[error("{status} {code}: {message}")]
pub struct ApiError {
    pub status: reqwest::StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Decodes an error body. The services don't agree on a shape, so this
    /// accepts `{code, message}`, `{code, detail}`, `{error: {code, detail}}`
    /// and `{reason}`, falling back to the raw text.
    pub fn from_body(status: reqwest::StatusCode, body: &[u8]) -> Self {
        use serde_json::Value;

        fn text(v: &Value) -> Option<String> {
            match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }
        }

        let parsed = serde_json::from_slice::<Value>(body)
            .ok()
            .filter(Value::is_object);

        let (code, message) = match parsed {
            Some(json) => {
                let inner = json.get("error").filter(|e| e.is_object()).unwrap_or(&json);
                let code = inner.get("code").and_then(text);
                let message = ["message", "detail", "reason"]
                    .iter()
                    .find_map(|k| inner.get(*k).and_then(text))
                    .unwrap_or_else(|| json.to_string());
                (code, message)
            }
            None => {
                let message = match std::str::from_utf8(body) {
                    Ok(s) if !s.trim().is_empty() => s.trim().to_owned(),
                    _ => format!("failed to retrieve error for {status}"),
                };
                (None, message)
            }
        };

        Self {
            status,
            code: code.unwrap_or_else(|| "Error".to_owned()),
            message,
        }
    }
}

/// A bearer-authenticated client for one service's REST API
#[derive(Clone, Debug)]
pub struct ServiceClient {
    client: reqwest::Client,
    base: String,
}

impl ServiceClient {
    pub fn new(access_token: &str, base: &str) -> anyhow::Result<Self> {
        let hm = {
            let mut auth = HeaderValue::try_from(format!("Bearer {access_token}"))
                .context("failed to convert token to header value")?;
            auth.set_sensitive(true);

            let mut hm = HeaderMap::new();
            hm.insert(header::AUTHORIZATION, auth);
            hm.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
            hm
        };

        let client = reqwest::Client::builder()
            .default_headers(hm)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build client")?;

        Ok(Self::with_client(client, base))
    }

    /// Wraps an already configured client, eg. one without a bearer token
    pub fn with_client(client: reqwest::Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_owned(),
        }
    }

    /// A client that sends no credentials by default
    pub fn anonymous(base: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build client")?;
        Ok(Self::with_client(client, base))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> anyhow::Result<url::Url> {
        let url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        url::Url::parse(&url).with_context(|| format!("invalid url '{url}'"))
    }

    /// Starts a request without sending it, for callers that need to shape
    /// the body themselves
    pub fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> anyhow::Result<reqwest::RequestBuilder> {
        Ok(self.client.request(method, self.url(path)?))
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str, query: &Query) -> anyhow::Result<R> {
        self.execute(self.request(reqwest::Method::GET, path)?.query(query))
            .await
    }

    pub async fn post<B, R>(&self, path: &str, body: &B) -> anyhow::Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.execute(self.request(reqwest::Method::POST, path)?.json(body))
            .await
    }

    /// POSTs with no body, for action endpoints like `cancel`
    pub async fn post_empty<R: DeserializeOwned>(&self, path: &str) -> anyhow::Result<R> {
        self.execute(self.request(reqwest::Method::POST, path)?)
            .await
    }

    pub async fn put<B, R>(&self, path: &str, body: &B) -> anyhow::Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.execute(self.request(reqwest::Method::PUT, path)?.json(body))
            .await
    }

    pub async fn patch<B, R>(&self, path: &str, body: &B) -> anyhow::Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.execute(self.request(reqwest::Method::PATCH, path)?.json(body))
            .await
    }

    pub async fn delete<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &Query,
    ) -> anyhow::Result<R> {
        self.execute(self.request(reqwest::Method::DELETE, path)?.query(query))
            .await
    }

    /// Sends the request and deserializes a successful JSON response, or
    /// returns the decoded [`ApiError`]
    pub async fn execute<R: DeserializeOwned>(
        &self,
        rb: reqwest::RequestBuilder,
    ) -> anyhow::Result<R> {
        let request = rb.build().context("failed to build request")?;
        let method = request.method().clone();
        let url = request.url().clone();

        tracing::debug!(%method, %url, "sending request");

        let response = self
            .client
            .execute(request)
            .await
            .context("failed to send request")?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .context("failed to read response body")?;

        tracing::debug!(%method, %url, %status, len = body.len(), "received response");

        if !status.is_success() {
            return Err(ApiError::from_body(status, &body).into());
        }

        // Some deletes answer with an empty 204
        let body: &[u8] = if body.is_empty() { b"null" } else { &body };

        serde_json::from_slice(body).context("failed to deserialize response body")
    }
}

/// Repeatedly fetches a resource until `done` is satisfied. The caller's
/// deadline is what bounds this.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    mut fetch: F,
    done: impl Fn(&T) -> bool,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        let current = fetch().await?;
        if done(&current) {
            return Ok(current);
        }

        tracing::info!(attempt, ?interval, "not finished yet, waiting");
        attempt += 1;
        tokio::time::sleep(interval).await;
    }
}

/// Parses a polling interval given in whole seconds
pub fn parse_polling_interval(s: &str) -> Result<Duration, String> {
    let secs: u64 = s
        .parse()
        .map_err(|err| format!("`{s}` isn't a valid number of seconds {err}"))?;
    if secs == 0 {
        Err("the polling interval must be at least 1 second".to_owned())
    } else {
        Ok(Duration::from_secs(secs))
    }
}
