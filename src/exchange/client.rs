//! FCoin REST API client.

use crate::config::FcoinConfig;
use crate::exchange::traits::ExchangeApi;
use crate::exchange::types::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use sha1::Sha1;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument};

pub const MAINNET_BASE_URL: &str = "https://api.fcoin.com/v2";

const HEADER_KEY: &str = "FC-ACCESS-KEY";
const HEADER_SIGNATURE: &str = "FC-ACCESS-SIGNATURE";
const HEADER_TIMESTAMP: &str = "FC-ACCESS-TIMESTAMP";

/// FCoin API client for public market data and the private account.
pub struct FcoinClient {
    http: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
}

impl FcoinClient {
    /// Create a new FCoin client from configuration.
    pub fn new(config: &FcoinConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the string that gets signed.
    ///
    /// GET requests sign `METHOD + URL + timestamp` where the URL already
    /// carries its sorted query string. POST requests append the body
    /// parameters sorted by key.
    fn signature_payload(
        method: &Method,
        url: &str,
        timestamp: i64,
        params: Option<&BTreeMap<&'static str, String>>,
    ) -> String {
        let mut payload = format!("{}{}{}", method.as_str(), url, timestamp);
        if let Some(params) = params {
            let body = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            payload.push_str(&body);
        }
        payload
    }

    /// HMAC-SHA1 over the base64 of `payload`, itself base64 encoded.
    fn sign(&self, payload: &str) -> String {
        let encoded = BASE64.encode(payload.as_bytes());
        let mut mac = Hmac::<Sha1>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(encoded.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Current timestamp in milliseconds.
    fn timestamp() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Attach the authentication headers for a private request.
    fn signed(
        &self,
        method: Method,
        url: &str,
        params: Option<&BTreeMap<&'static str, String>>,
    ) -> RequestBuilder {
        let timestamp = Self::timestamp();
        let signature = self.sign(&Self::signature_payload(&method, url, timestamp, params));

        self.http
            .request(method, url)
            .header(HEADER_KEY, &self.api_key)
            .header(HEADER_SIGNATURE, signature)
            .header(HEADER_TIMESTAMP, timestamp.to_string())
    }

    async fn decode<T: DeserializeOwned>(
        request: RequestBuilder,
        what: &'static str,
    ) -> Result<ApiResponse<T>> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", what))?;

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }
}

#[async_trait]
impl ExchangeApi for FcoinClient {
    // ==================== Public ====================

    #[instrument(skip(self))]
    async fn get_currencies(&self) -> Result<ApiResponse<Vec<String>>> {
        let url = format!("{}/public/currencies", self.base_url);
        Self::decode(self.http.get(&url), "currencies").await
    }

    #[instrument(skip(self))]
    async fn get_server_time(&self) -> Result<ApiResponse<i64>> {
        let url = format!("{}/public/server-time", self.base_url);
        Self::decode(self.http.get(&url), "server time").await
    }

    #[instrument(skip(self))]
    async fn get_ticker(&self, symbol: &str) -> Result<ApiResponse<TickerData>> {
        let url = format!("{}/market/ticker/{}", self.base_url, symbol);
        Self::decode(self.http.get(&url), "ticker").await
    }

    // ==================== Private ====================

    #[instrument(skip(self))]
    async fn get_balance(&self) -> Result<ApiResponse<Vec<BalanceRecord>>> {
        let url = format!("{}/accounts/balance", self.base_url);
        Self::decode(self.signed(Method::GET, &url, None), "balance").await
    }

    #[instrument(skip(self))]
    async fn list_orders(&self, query: &OrderQuery) -> Result<ApiResponse<Vec<OpenOrder>>> {
        let url = format!("{}/orders?{}", self.base_url, query.to_query_string());
        Self::decode(self.signed(Method::GET, &url, None), "orders").await
    }

    #[instrument(skip(self))]
    async fn create_order(&self, order: &NewOrder) -> Result<ApiResponse<String>> {
        let url = format!("{}/orders", self.base_url);
        let params = order.params();

        debug!(?order, "Placing order");

        let request = self.signed(Method::POST, &url, Some(&params)).json(order);
        Self::decode(request, "create order").await
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, order_id: &str) -> Result<ApiResponse<bool>> {
        let url = format!("{}/orders/{}/submit-cancel", self.base_url, order_id);
        Self::decode(self.signed(Method::POST, &url, None), "cancel order").await
    }
}
