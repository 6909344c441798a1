//! Binance USD-M futures REST surface: wire-shaped request/response types and
//! the [`RequestSigner`] implementation (HMAC query signing, API error code
//! classification) built on the venue-neutral
//! [`xchange_integration::protocol::http`] seam.

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::borrow::Cow;
use xchange_integration::protocol::http::{RequestSigner, RestRequest};
use xchange_integration::SocketError;

/// Binance request signer: every private endpoint gets `timestamp` +
/// `signature` query params and an `X-MBX-APIKEY` header.
#[derive(Debug, Clone)]
pub struct BinanceRequestSigner {
    api_key: String,
    secret_key: String,
}

impl BinanceRequestSigner {
    fn sign_query(&self, query_string: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl RequestSigner for BinanceRequestSigner {
    type Config<'a> = (&'a str, &'a str);

    fn new(config: Self::Config<'_>) -> Self {
        Self {
            api_key: config.0.to_string(),
            secret_key: config.1.to_string(),
        }
    }

    fn sign<Request>(
        &self,
        request: &Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest,
    {
        let timestamp = Utc::now().timestamp_millis();
        let mut query = request
            .query_params()
            .map(|p| serde_urlencoded::to_string(p))
            .transpose()
            .map_err(|e| SocketError::Serialization(e.to_string()))?
            .unwrap_or_default();
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("timestamp={timestamp}"));
        let signature = self.sign_query(&query);

        let builder = builder
            .header("X-MBX-APIKEY", &self.api_key)
            .query(&[("timestamp", timestamp.to_string())])
            .query(&[("signature", signature)]);
        builder
            .build()
            .map_err(|e| SocketError::BuildRequest(e.to_string()))
    }
}

/// Binance's `{code, msg}` error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceApiError {
    pub code: i32,
    pub msg: String,
}

impl BinanceApiError {
    /// Maps the venue's numeric code to an [`ErrorKind`](crate::error::ErrorKind),
    /// keyed off Binance's own finer-grained error codes rather than HTTP
    /// status alone.
    pub fn classify(&self) -> crate::error::ErrorKind {
        use crate::error::ErrorKind;
        match self.code {
            -1002 | -2015 | -1022 => ErrorKind::AuthenticationError,
            -2010 | -2011 => ErrorKind::InsufficientFunds,
            -1013 | -1100..=-1106 | -1111 | -1115..=-1120 | -1128 | -1130 => ErrorKind::InvalidOrder,
            -2013 => ErrorKind::OrderNotFound,
            -1003 | -1015 => ErrorKind::RateLimitExceeded,
            -1001 | -1006 | -1007 | -1016 => ErrorKind::NetworkError,
            -1121 => ErrorKind::InvalidSymbol,
            _ => ErrorKind::ExchangeError,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceOrder {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: u64,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub status: String,
    pub price: String,
    #[serde(rename = "avgPrice", default)]
    pub avg_price: Option<String>,
    #[serde(rename = "origQty")]
    pub orig_qty: String,
    #[serde(rename = "executedQty")]
    pub executed_qty: String,
    #[serde(rename = "cumQuote", default)]
    pub cum_quote: Option<String>,
    pub time: i64,
    #[serde(rename = "updateTime", default)]
    pub update_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderQuery {
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub quantity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(rename = "timeInForce", skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
    #[serde(rename = "newClientOrderId", skip_serializing_if = "Option::is_none")]
    pub new_client_order_id: Option<String>,
    #[serde(rename = "reduceOnly", skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
}

pub struct CreateOrder(pub CreateOrderQuery);

impl RestRequest for CreateOrder {
    type Response = BinanceOrder;
    type QueryParams = CreateOrderQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/order")
    }
    fn method() -> Method {
        Method::POST
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolOrderIdQuery {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: u64,
}

pub struct CancelOrder(pub SymbolOrderIdQuery);

impl RestRequest for CancelOrder {
    type Response = BinanceOrder;
    type QueryParams = SymbolOrderIdQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/order")
    }
    fn method() -> Method {
        Method::DELETE
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolQuery {
    pub symbol: String,
}

pub struct CancelAllOrders(pub SymbolQuery);

impl RestRequest for CancelAllOrders {
    type Response = serde_json::Value;
    type QueryParams = SymbolQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/allOpenOrders")
    }
    fn method() -> Method {
        Method::DELETE
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

pub struct FetchOrder(pub SymbolOrderIdQuery);

impl RestRequest for FetchOrder {
    type Response = BinanceOrder;
    type QueryParams = SymbolOrderIdQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/order")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct OptionalSymbolQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

pub struct FetchOpenOrders(pub OptionalSymbolQuery);

impl RestRequest for FetchOpenOrders {
    type Response = Vec<BinanceOrder>;
    type QueryParams = OptionalSymbolQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/openOrders")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct HistoryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub struct FetchAllOrders(pub HistoryQuery);

impl RestRequest for FetchAllOrders {
    type Response = Vec<BinanceOrder>;
    type QueryParams = HistoryQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/allOrders")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceTrade {
    pub id: u64,
    pub symbol: String,
    pub price: String,
    pub qty: String,
    pub side: Option<String>,
    #[serde(rename = "buyer", default)]
    pub buyer: Option<bool>,
    pub time: i64,
}

pub struct FetchMyTrades(pub HistoryQuery);

impl RestRequest for FetchMyTrades {
    type Response = Vec<BinanceTrade>;
    type QueryParams = HistoryQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/userTrades")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceBalanceEntry {
    pub asset: String,
    #[serde(rename = "availableBalance")]
    pub available_balance: String,
    pub balance: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAccount {
    #[serde(rename = "totalWalletBalance")]
    pub total_wallet_balance: String,
    #[serde(rename = "availableBalance")]
    pub available_balance: String,
    #[serde(rename = "totalMarginBalance")]
    pub total_margin_balance: String,
    #[serde(rename = "totalUnrealizedProfit")]
    pub total_unrealized_profit: String,
    pub assets: Vec<BinanceBalanceEntry>,
    pub positions: Vec<BinancePositionEntry>,
    #[serde(rename = "updateTime", default)]
    pub update_time: i64,
}

pub struct FetchAccount;

impl RestRequest for FetchAccount {
    type Response = BinanceAccount;
    type QueryParams = ();
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v2/account")
    }
    fn method() -> Method {
        Method::GET
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinancePositionEntry {
    pub symbol: String,
    #[serde(rename = "positionAmt")]
    pub position_amt: String,
    #[serde(rename = "entryPrice")]
    pub entry_price: String,
    #[serde(rename = "markPrice", default)]
    pub mark_price: String,
    #[serde(rename = "liquidationPrice", default)]
    pub liquidation_price: String,
    #[serde(rename = "unRealizedProfit", default)]
    pub unrealized_profit: String,
    #[serde(rename = "marginType", default)]
    pub margin_type: String,
    pub leverage: String,
    #[serde(rename = "isolatedMargin", default)]
    pub isolated_margin: String,
    pub notional: String,
}

pub struct FetchPositionRisk;

impl RestRequest for FetchPositionRisk {
    type Response = Vec<BinancePositionEntry>;
    type QueryParams = ();
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v2/positionRisk")
    }
    fn method() -> Method {
        Method::GET
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeverageQuery {
    pub symbol: String,
    pub leverage: u32,
}

pub struct SetLeverage(pub LeverageQuery);

impl RestRequest for SetLeverage {
    type Response = serde_json::Value;
    type QueryParams = LeverageQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/leverage")
    }
    fn method() -> Method {
        Method::POST
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MarginTypeQuery {
    pub symbol: String,
    #[serde(rename = "marginType")]
    pub margin_type: String,
}

pub struct SetMarginType(pub MarginTypeQuery);

impl RestRequest for SetMarginType {
    type Response = serde_json::Value;
    type QueryParams = MarginTypeQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/marginType")
    }
    fn method() -> Method {
        Method::POST
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceSymbolFilter {
    #[serde(rename = "filterType")]
    pub filter_type: String,
    #[serde(rename = "tickSize", default)]
    pub tick_size: Option<String>,
    #[serde(rename = "stepSize", default)]
    pub step_size: Option<String>,
    #[serde(rename = "minQty", default)]
    pub min_qty: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceSymbolInfo {
    pub symbol: String,
    #[serde(rename = "baseAsset")]
    pub base_asset: String,
    #[serde(rename = "quoteAsset")]
    pub quote_asset: String,
    #[serde(rename = "marginAsset", default)]
    pub margin_asset: Option<String>,
    pub status: String,
    #[serde(rename = "pricePrecision")]
    pub price_precision: u32,
    #[serde(rename = "quantityPrecision")]
    pub quantity_precision: u32,
    pub filters: Vec<BinanceSymbolFilter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceExchangeInfo {
    pub symbols: Vec<BinanceSymbolInfo>,
}

pub struct FetchExchangeInfo;

impl RestRequest for FetchExchangeInfo {
    type Response = BinanceExchangeInfo;
    type QueryParams = ();
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/exchangeInfo")
    }
    fn method() -> Method {
        Method::GET
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceTicker24h {
    pub symbol: String,
    #[serde(rename = "bidPrice", default)]
    pub bid_price: Option<String>,
    #[serde(rename = "askPrice", default)]
    pub ask_price: Option<String>,
    #[serde(rename = "lastPrice")]
    pub last_price: String,
    #[serde(rename = "highPrice")]
    pub high_price: String,
    #[serde(rename = "lowPrice")]
    pub low_price: String,
    pub volume: String,
    #[serde(rename = "quoteVolume")]
    pub quote_volume: String,
    #[serde(rename = "closeTime")]
    pub close_time: i64,
}

pub struct FetchTicker24h(pub SymbolQuery);

impl RestRequest for FetchTicker24h {
    type Response = BinanceTicker24h;
    type QueryParams = SymbolQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/ticker/24hr")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceDepth {
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepthQuery {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub struct FetchDepth(pub DepthQuery);

impl RestRequest for FetchDepth {
    type Response = BinanceDepth;
    type QueryParams = DepthQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/depth")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAggTrade {
    pub a: u64,
    pub p: String,
    pub q: String,
    #[serde(rename = "T")]
    pub timestamp: i64,
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggTradesQuery {
    pub symbol: String,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub struct FetchAggTrades(pub AggTradesQuery);

impl RestRequest for FetchAggTrades {
    type Response = Vec<BinanceAggTrade>;
    type QueryParams = AggTradesQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/aggTrades")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

/// `[openTime, open, high, low, close, volume, closeTime, ...]` — Binance
/// encodes klines as heterogeneous JSON arrays, not objects.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceKlineRow(
    pub i64,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub serde_json::Value,
    pub serde_json::Value,
    pub serde_json::Value,
    pub serde_json::Value,
    pub serde_json::Value,
    pub serde_json::Value,
);

#[derive(Debug, Clone, Serialize)]
pub struct KlineQuery {
    pub symbol: String,
    pub interval: String,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub struct FetchKlines(pub KlineQuery);

impl RestRequest for FetchKlines {
    type Response = Vec<BinanceKlineRow>;
    type QueryParams = KlineQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/klines")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

pub struct FetchMarkPriceKlines(pub KlineQuery);

impl RestRequest for FetchMarkPriceKlines {
    type Response = Vec<BinanceKlineRow>;
    type QueryParams = KlineQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/markPriceKlines")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceFundingRateRow {
    #[serde(rename = "fundingTime")]
    pub funding_time: i64,
    #[serde(rename = "fundingRate")]
    pub funding_rate: String,
    #[serde(rename = "markPrice", default)]
    pub mark_price: Option<String>,
}

pub struct FetchFundingRate(pub SymbolQuery);

impl RestRequest for FetchFundingRate {
    type Response = Vec<BinanceFundingRateRow>;
    type QueryParams = SymbolQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/premiumIndex")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

pub struct FetchFundingRateHistory(pub HistoryQuery);

impl RestRequest for FetchFundingRateHistory {
    type Response = Vec<BinanceFundingRateRow>;
    type QueryParams = HistoryQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/fapi/v1/fundingRate")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceOpenInterestRow {
    #[serde(rename = "sumOpenInterest")]
    pub sum_open_interest: String,
    #[serde(rename = "sumOpenInterestValue")]
    pub sum_open_interest_value: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenInterestHistQuery {
    pub symbol: String,
    pub period: String,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub struct FetchOpenInterestHist(pub OpenInterestHistQuery);

impl RestRequest for FetchOpenInterestHist {
    type Response = Vec<BinanceOpenInterestRow>;
    type QueryParams = OpenInterestHistQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/futures/data/openInterestHist")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}
