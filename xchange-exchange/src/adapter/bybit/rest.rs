//! Bybit v5 unified-account REST surface (linear perpetuals): wire-shaped
//! request/response types and the [`RequestSigner`] implementation. The
//! [`VenueAdapter`](crate::adapter::VenueAdapter) seam is the same generalized
//! shape the Binance adapter implements; only the signing scheme and payload
//! layout differ, which is exactly the axis this seam was built to vary.

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::borrow::Cow;
use xchange_integration::protocol::http::{RequestSigner, RestRequest};
use xchange_integration::SocketError;

const RECV_WINDOW_MS: i64 = 5_000;

#[derive(Debug, Clone)]
pub struct BybitRequestSigner {
    api_key: String,
    secret_key: String,
}

impl BybitRequestSigner {
    fn sign_payload(&self, timestamp: i64, payload: &str) -> String {
        let prehash = format!("{timestamp}{}{RECV_WINDOW_MS}{payload}", self.api_key);
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(prehash.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl RequestSigner for BybitRequestSigner {
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
        let (builder, payload) = match Request::method() {
            Method::GET | Method::DELETE => {
                let query = request
                    .query_params()
                    .map(serde_urlencoded::to_string)
                    .transpose()
                    .map_err(|e| SocketError::Serialization(e.to_string()))?
                    .unwrap_or_default();
                (builder.query(request.query_params()), query)
            }
            _ => {
                let body = request
                    .body()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| SocketError::Serialization(e.to_string()))?
                    .unwrap_or_default();
                (builder.json(&request.body()), body)
            }
        };
        let signature = self.sign_payload(timestamp, &payload);

        builder
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .header("X-BAPI-SIGN", signature)
            .build()
            .map_err(|e| SocketError::BuildRequest(e.to_string()))
    }
}

/// Bybit's `{retCode, retMsg}` envelope, unwrapped from the common response
/// shape `{retCode, retMsg, result, time}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BybitEnvelope<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i32,
    #[serde(rename = "retMsg")]
    pub ret_msg: String,
    pub result: T,
}

impl BybitEnvelope<serde_json::Value> {
    pub fn classify(ret_code: i32) -> crate::error::ErrorKind {
        use crate::error::ErrorKind;
        match ret_code {
            10003 | 10004 | 10005 => ErrorKind::AuthenticationError,
            110007 | 110012 => ErrorKind::InsufficientFunds,
            10001 | 110017 | 110094 => ErrorKind::InvalidOrder,
            110001 => ErrorKind::OrderNotFound,
            10006 | 10018 => ErrorKind::RateLimitExceeded,
            10002 => ErrorKind::NetworkError,
            10016 => ErrorKind::ExchangeError,
            110009 => ErrorKind::InvalidSymbol,
            _ => ErrorKind::ExchangeError,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CategoryQuery {
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderBody {
    pub category: String,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "orderType")]
    pub order_type: String,
    pub qty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(rename = "orderLinkId", skip_serializing_if = "Option::is_none")]
    pub order_link_id: Option<String>,
    #[serde(rename = "reduceOnly", skip_serializing_if = "Option::is_none")]
    pub reduce_only: Option<bool>,
    #[serde(rename = "timeInForce")]
    pub time_in_force: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitOrderListResult {
    pub list: Vec<BybitOrder>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitOrder {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "orderLinkId", default)]
    pub order_link_id: String,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "orderType")]
    pub order_type: String,
    #[serde(rename = "orderStatus")]
    pub order_status: String,
    pub price: String,
    #[serde(rename = "avgPrice", default)]
    pub avg_price: String,
    pub qty: String,
    #[serde(rename = "cumExecQty")]
    pub cum_exec_qty: String,
    #[serde(rename = "cumExecValue", default)]
    pub cum_exec_value: String,
    #[serde(rename = "createdTime")]
    pub created_time: String,
    #[serde(rename = "updatedTime", default)]
    pub updated_time: String,
}

pub struct CreateOrder(pub CreateOrderBody);

impl RestRequest for CreateOrder {
    type Response = BybitEnvelope<BybitOrder>;
    type QueryParams = ();
    type Body = CreateOrderBody;
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/create")
    }
    fn method() -> Method {
        Method::POST
    }
    fn body(&self) -> Option<&Self::Body> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderBody {
    pub category: String,
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
}

pub struct CancelOrder(pub CancelOrderBody);

impl RestRequest for CancelOrder {
    type Response = BybitEnvelope<serde_json::Value>;
    type QueryParams = ();
    type Body = CancelOrderBody;
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/cancel")
    }
    fn method() -> Method {
        Method::POST
    }
    fn body(&self) -> Option<&Self::Body> {
        Some(&self.0)
    }
}

pub struct CancelAllOrders(pub CategoryQuery);

impl RestRequest for CancelAllOrders {
    type Response = BybitEnvelope<serde_json::Value>;
    type QueryParams = ();
    type Body = CategoryQuery;
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/cancel-all")
    }
    fn method() -> Method {
        Method::POST
    }
    fn body(&self) -> Option<&Self::Body> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct OrderQuery {
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(rename = "orderId", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub struct FetchOrderHistory(pub OrderQuery);

impl RestRequest for FetchOrderHistory {
    type Response = BybitEnvelope<BybitOrderListResult>;
    type QueryParams = OrderQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/history")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

pub struct FetchOpenOrders(pub OrderQuery);

impl RestRequest for FetchOpenOrders {
    type Response = BybitEnvelope<BybitOrderListResult>;
    type QueryParams = OrderQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/realtime")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitTradeListResult {
    pub list: Vec<BybitTrade>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitTrade {
    #[serde(rename = "execId")]
    pub exec_id: String,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "execPrice")]
    pub exec_price: String,
    #[serde(rename = "execQty")]
    pub exec_qty: String,
    #[serde(rename = "execTime")]
    pub exec_time: String,
}

pub struct FetchMyTrades(pub OrderQuery);

impl RestRequest for FetchMyTrades {
    type Response = BybitEnvelope<BybitTradeListResult>;
    type QueryParams = OrderQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/execution/list")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitWalletListResult {
    pub list: Vec<BybitWallet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitWallet {
    #[serde(rename = "totalEquity")]
    pub total_equity: String,
    #[serde(rename = "totalAvailableBalance")]
    pub total_available_balance: String,
    #[serde(rename = "totalMarginBalance")]
    pub total_margin_balance: String,
    #[serde(rename = "totalPerpUPL")]
    pub total_perp_upl: String,
    pub coin: Vec<BybitCoinBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitCoinBalance {
    pub coin: String,
    #[serde(rename = "walletBalance")]
    pub wallet_balance: String,
    #[serde(rename = "availableToWithdraw", default)]
    pub available_to_withdraw: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletBalanceQuery {
    #[serde(rename = "accountType")]
    pub account_type: String,
}

pub struct FetchWalletBalance(pub WalletBalanceQuery);

impl RestRequest for FetchWalletBalance {
    type Response = BybitEnvelope<BybitWalletListResult>;
    type QueryParams = WalletBalanceQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/account/wallet-balance")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitPositionListResult {
    pub list: Vec<BybitPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitPosition {
    pub symbol: String,
    pub side: String,
    pub size: String,
    #[serde(rename = "avgPrice")]
    pub avg_price: String,
    #[serde(rename = "markPrice")]
    pub mark_price: String,
    #[serde(rename = "liqPrice", default)]
    pub liq_price: String,
    #[serde(rename = "unrealisedPnl")]
    pub unrealised_pnl: String,
    #[serde(rename = "cumRealisedPnl", default)]
    pub cum_realised_pnl: String,
    #[serde(rename = "tradeMode")]
    pub trade_mode: u8,
    pub leverage: String,
    #[serde(rename = "positionIM", default)]
    pub position_im: String,
    #[serde(rename = "positionValue")]
    pub position_value: String,
}

pub struct FetchPositions(pub CategoryQuery);

impl RestRequest for FetchPositions {
    type Response = BybitEnvelope<BybitPositionListResult>;
    type QueryParams = CategoryQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/position/list")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetLeverageBody {
    pub category: String,
    pub symbol: String,
    #[serde(rename = "buyLeverage")]
    pub buy_leverage: String,
    #[serde(rename = "sellLeverage")]
    pub sell_leverage: String,
}

pub struct SetLeverage(pub SetLeverageBody);

impl RestRequest for SetLeverage {
    type Response = BybitEnvelope<serde_json::Value>;
    type QueryParams = ();
    type Body = SetLeverageBody;
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/position/set-leverage")
    }
    fn method() -> Method {
        Method::POST
    }
    fn body(&self) -> Option<&Self::Body> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchMarginModeBody {
    pub category: String,
    pub symbol: String,
    #[serde(rename = "tradeMode")]
    pub trade_mode: u8,
    #[serde(rename = "buyLeverage")]
    pub buy_leverage: String,
    #[serde(rename = "sellLeverage")]
    pub sell_leverage: String,
}

pub struct SwitchMarginMode(pub SwitchMarginModeBody);

impl RestRequest for SwitchMarginMode {
    type Response = BybitEnvelope<serde_json::Value>;
    type QueryParams = ();
    type Body = SwitchMarginModeBody;
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/position/switch-isolated")
    }
    fn method() -> Method {
        Method::POST
    }
    fn body(&self) -> Option<&Self::Body> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitInstrumentListResult {
    pub list: Vec<BybitInstrument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitInstrument {
    pub symbol: String,
    #[serde(rename = "baseCoin")]
    pub base_coin: String,
    #[serde(rename = "quoteCoin")]
    pub quote_coin: String,
    pub status: String,
    #[serde(rename = "priceScale")]
    pub price_scale: String,
    #[serde(rename = "lotSizeFilter")]
    pub lot_size_filter: BybitLotSizeFilter,
    #[serde(rename = "priceFilter")]
    pub price_filter: BybitPriceFilter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitLotSizeFilter {
    #[serde(rename = "qtyStep")]
    pub qty_step: String,
    #[serde(rename = "minOrderQty")]
    pub min_order_qty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitPriceFilter {
    #[serde(rename = "tickSize")]
    pub tick_size: String,
}

pub struct FetchInstruments(pub CategoryQuery);

impl RestRequest for FetchInstruments {
    type Response = BybitEnvelope<BybitInstrumentListResult>;
    type QueryParams = CategoryQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/instruments-info")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitTickerListResult {
    pub list: Vec<BybitTicker>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitTicker {
    pub symbol: String,
    #[serde(rename = "bid1Price", default)]
    pub bid1_price: String,
    #[serde(rename = "ask1Price", default)]
    pub ask1_price: String,
    #[serde(rename = "lastPrice")]
    pub last_price: String,
    #[serde(rename = "highPrice24h")]
    pub high_price_24h: String,
    #[serde(rename = "lowPrice24h")]
    pub low_price_24h: String,
    #[serde(rename = "volume24h")]
    pub volume_24h: String,
    #[serde(rename = "turnover24h")]
    pub turnover_24h: String,
}

pub struct FetchTicker(pub CategoryQuery);

impl RestRequest for FetchTicker {
    type Response = BybitEnvelope<BybitTickerListResult>;
    type QueryParams = CategoryQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/tickers")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitOrderBookResult {
    pub s: String,
    pub b: Vec<(String, String)>,
    pub a: Vec<(String, String)>,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderBookQuery {
    pub category: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub struct FetchOrderBook(pub OrderBookQuery);

impl RestRequest for FetchOrderBook {
    type Response = BybitEnvelope<BybitOrderBookResult>;
    type QueryParams = OrderBookQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/orderbook")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitPublicTradeListResult {
    pub list: Vec<BybitPublicTrade>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitPublicTrade {
    #[serde(rename = "execId")]
    pub exec_id: String,
    pub symbol: String,
    pub side: String,
    pub price: String,
    pub size: String,
    pub time: String,
}

pub struct FetchPublicTrades(pub CategoryQuery);

impl RestRequest for FetchPublicTrades {
    type Response = BybitEnvelope<BybitPublicTradeListResult>;
    type QueryParams = CategoryQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/recent-trade")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

/// `[startTime, open, high, low, close, volume, turnover]`.
#[derive(Debug, Clone, Deserialize)]
pub struct BybitKlineRow(
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
);

#[derive(Debug, Clone, Deserialize)]
pub struct BybitKlineListResult {
    pub list: Vec<BybitKlineRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KlineQuery {
    pub category: String,
    pub symbol: String,
    pub interval: String,
    #[serde(rename = "start", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(rename = "end", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub struct FetchKline(pub KlineQuery);

impl RestRequest for FetchKline {
    type Response = BybitEnvelope<BybitKlineListResult>;
    type QueryParams = KlineQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/kline")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

pub struct FetchMarkPriceKline(pub KlineQuery);

impl RestRequest for FetchMarkPriceKline {
    type Response = BybitEnvelope<BybitKlineListResult>;
    type QueryParams = KlineQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/mark-price-kline")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitFundingRow {
    pub symbol: String,
    #[serde(rename = "fundingRate")]
    pub funding_rate: String,
    #[serde(rename = "fundingRateTimestamp")]
    pub funding_rate_timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitFundingListResult {
    pub list: Vec<BybitFundingRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FundingHistoryQuery {
    pub category: String,
    pub symbol: String,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub struct FetchFundingHistory(pub FundingHistoryQuery);

impl RestRequest for FetchFundingHistory {
    type Response = BybitEnvelope<BybitFundingListResult>;
    type QueryParams = FundingHistoryQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/funding/history")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitOpenInterestRow {
    #[serde(rename = "openInterest")]
    pub open_interest: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitOpenInterestListResult {
    pub list: Vec<BybitOpenInterestRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenInterestQuery {
    pub category: String,
    pub symbol: String,
    #[serde(rename = "intervalTime")]
    pub interval_time: String,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

pub struct FetchOpenInterest(pub OpenInterestQuery);

impl RestRequest for FetchOpenInterest {
    type Response = BybitEnvelope<BybitOpenInterestListResult>;
    type QueryParams = OpenInterestQuery;
    type Body = ();
    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/open-interest")
    }
    fn method() -> Method {
        Method::GET
    }
    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.0)
    }
}
