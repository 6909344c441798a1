//! REST request/signing abstractions.
//!
//! A venue-neutral seam: an adapter describes a REST call as a
//! [`RestRequest`] impl, and a per-venue [`RequestSigner`] attaches whatever
//! authentication that venue requires before the request is sent.

use crate::error::SocketError;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;

/// Describes one REST endpoint: its path, method, and typed
/// query/body/response shapes.
pub trait RestRequest {
    type Response: DeserializeOwned;
    type QueryParams: Serialize;
    type Body: Serialize;

    fn path(&self) -> Cow<'static, str>;
    fn method() -> Method;
    fn query_params(&self) -> Option<&Self::QueryParams> {
        None
    }
    fn body(&self) -> Option<&Self::Body> {
        None
    }
}

/// Attaches venue-specific authentication (HMAC signature, API key header) to
/// an outbound request. `Config<'a>` is typically `(&'a str, &'a str)` for
/// `(api_key, secret)`.
pub trait RequestSigner {
    type Config<'a>;

    fn new(config: Self::Config<'_>) -> Self;

    fn sign<Request>(
        &self,
        request: &Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest;
}

/// A signer that performs no signing, for public (unauthenticated) endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigner;

impl RequestSigner for NoopSigner {
    type Config<'a> = ();

    fn new(_config: Self::Config<'_>) -> Self {
        Self
    }

    fn sign<Request>(
        &self,
        _request: &Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest,
    {
        builder
            .build()
            .map_err(|e| SocketError::BuildRequest(e.to_string()))
    }
}

/// Minimal signed REST client: builds a request from a base URL + a
/// [`RestRequest`], signs it with `S`, executes it, and deserializes the
/// response. Per-call timeout defaults to 30s.
#[derive(Debug, Clone)]
pub struct RestClient<S> {
    http: reqwest::Client,
    base_url: url::Url,
    signer: S,
}

impl<S> RestClient<S>
where
    S: RequestSigner,
{
    pub fn new(base_url: url::Url, signer: S) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client with static config always builds"),
            base_url,
            signer,
        }
    }

    pub async fn execute<Request>(&self, request: Request) -> Result<Request::Response, SocketError>
    where
        Request: RestRequest,
    {
        let url = self
            .base_url
            .join(&request.path())
            .map_err(|e| SocketError::BuildRequest(e.to_string()))?;

        let mut builder = self.http.request(Request::method(), url);
        if let Some(query) = request.query_params() {
            builder = builder.query(query);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let signed = self.signer.sign(&request, builder)?;
        let response = self.http.execute(signed).await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SocketError::HttpStatus { status, body });
        }

        let body = response.json::<Request::Response>().await?;
        Ok(body)
    }
}
