//! C3 Broker Session: typed access to the brokerage REST API over an
//! OAuth2 code flow. Mirrors the teacher's retrying-middleware HTTP client
//! pattern (`infrastructure::http_client_factory`) and its request/response
//! logging discipline (method/path/status/latency, never headers or body).

use crate::application::token_manager::TokenRefresher;
use crate::domain::errors::{AppError, BrokerError};
use crate::domain::token::TokenRecord;
use crate::infrastructure::observability::metrics;
use async_trait::async_trait;
use chrono::Duration;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenUrl,
};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub uic: i64,
    pub ticker: String,
    pub description: String,
    pub quantity: Decimal,
    pub average_open_price: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub pnl: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub uic: i64,
    pub symbol: String,
    pub description: String,
    pub asset_type: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_key: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub cash_balance: Decimal,
    pub total_value: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Working,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum BuySell {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account_key: String,
    pub asset_type: String,
    pub buy_sell: BuySell,
    pub amount: Decimal,
    pub order_type: String,
    pub uic: i64,
    pub order_duration: String,
    pub manual_order: bool,
}

/// Response-policy mapping for every REST call C3 makes. 200/201/204 decode
/// as JSON (if any body); 401 maps to `AuthenticationError` so C2 can
/// trigger a refresh; 429 carries `Retry-After`; anything else non-2xx maps
/// to `ApiError` with the parsed message or a truncated body.
async fn handle_response<T: for<'de> Deserialize<'de> + Default>(
    response: reqwest::Response,
) -> Result<T, BrokerError> {
    let status = response.status();
    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(T::default());
    }
    if status.is_success() {
        let body = response.text().await.map_err(|e| BrokerError::Network(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        return serde_json::from_str(&body)
            .map_err(|e| BrokerError::Api(format!("decode error: {e}")));
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(BrokerError::Authentication("401 from broker".into()));
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Err(BrokerError::RateLimit {
            message: "rate limited".into(),
            retry_after_secs: retry_after,
        });
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|e| e.message.or(e.error_info.and_then(|i| i.message)))
        .unwrap_or_else(|| body.chars().take(500).collect());
    Err(BrokerError::Api(message))
}

fn status_class(status: reqwest::StatusCode) -> &'static str {
    match status.as_u16() / 100 {
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "other",
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "ErrorInfo")]
    error_info: Option<ErrorInfo>,
}

#[derive(Deserialize)]
struct ErrorInfo {
    #[serde(rename = "Message")]
    message: Option<String>,
}

/// `ClientKey` is cached by a hash of the access token so repeated calls on
/// the same token skip the identity lookup.
struct ClientKeyCache {
    entries: RwLock<HashMap<u64, String>>,
}

impl ClientKeyCache {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, token_hash: u64) -> Option<String> {
        self.entries.read().unwrap().get(&token_hash).cloned()
    }

    fn insert(&self, token_hash: u64, client_key: String) {
        self.entries.write().unwrap().insert(token_hash, client_key);
    }
}

fn hash_token(access_token: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    access_token.hash(&mut hasher);
    hasher.finish()
}

pub struct BrokerSession {
    http: ClientWithMiddleware,
    api_base_url: String,
    oauth: BasicClient,
    client_key_cache: ClientKeyCache,
}

impl BrokerSession {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        auth_base_url: String,
        api_base_url: String,
    ) -> Result<Self, AppError> {
        let oauth = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            AuthUrl::new(format!("{auth_base_url}/authorize"))
                .map_err(|e| AppError::Validation(e.to_string()))?,
            Some(
                TokenUrl::new(format!("{auth_base_url}/token"))
                    .map_err(|e| AppError::Validation(e.to_string()))?,
            ),
        )
        .set_redirect_uri(
            RedirectUrl::new(redirect_uri).map_err(|e| AppError::Validation(e.to_string()))?,
        );

        Ok(Self {
            http: crate::infrastructure::http_client_factory::HttpClientFactory::create_client(),
            api_base_url,
            oauth,
            client_key_cache: ClientKeyCache::new(),
        })
    }

    /// Step 1 of the OAuth2 code flow: constructs an authorization URL
    /// carrying a fresh CSRF `state`.
    pub fn authorization_url(&self, _user_id: &str) -> (String, String) {
        let (url, csrf) = self
            .oauth
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openapi".into()))
            .url();
        (url.to_string(), csrf.secret().clone())
    }

    /// Step 2: exchanges an authorization code for a token pair. The caller
    /// validates `state` against the one returned by `authorization_url`
    /// before calling this.
    pub async fn exchange_code(&self, code: String) -> Result<TokenRecord, BrokerError> {
        use oauth2::reqwest::async_http_client;
        use oauth2::TokenResponse;

        let token = self
            .oauth
            .exchange_code(AuthorizationCode::new(code))
            .request_async(async_http_client)
            .await
            .map_err(|e| BrokerError::Authentication(e.to_string()))?;

        Ok(TokenRecord::new(
            "saxo",
            token.access_token().secret().clone(),
            token.refresh_token().map(|t| t.secret().clone()),
            Duration::seconds(token.expires_in().map(|d| d.as_secs() as i64).unwrap_or(1200)),
            Some(Duration::hours(12)),
        ))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRecord, BrokerError> {
        use oauth2::reqwest::async_http_client;
        use oauth2::{RefreshToken, TokenResponse};

        let token = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| BrokerError::Authentication(e.to_string()))?;

        Ok(TokenRecord::new(
            "saxo",
            token.access_token().secret().clone(),
            token
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| Some(refresh_token.to_string())),
            Duration::seconds(token.expires_in().map(|d| d.as_secs() as i64).unwrap_or(1200)),
            Some(Duration::hours(12)),
        ))
    }

    async fn get<T: for<'de> Deserialize<'de> + Default>(
        &self,
        access_token: &str,
        path: &str,
    ) -> Result<T, BrokerError> {
        let start = Instant::now();
        let url = format!("{}{}", self.api_base_url, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;
        let status = response.status();
        let result = handle_response(response).await;
        let latency = start.elapsed();
        metrics::record_broker_http_call(path, status_class(status), latency.as_secs_f64());
        debug!(method = "GET", path, status = status.as_u16(), latency_ms = latency.as_millis() as u64, "broker call");
        result
    }

    pub async fn client_key(&self, access_token: &str) -> Result<String, BrokerError> {
        let hash = hash_token(access_token);
        if let Some(cached) = self.client_key_cache.get(hash) {
            return Ok(cached);
        }
        #[derive(Deserialize, Default)]
        struct UserResponse {
            #[serde(rename = "ClientKey")]
            client_key: Option<String>,
        }
        let user: UserResponse = self.get(access_token, "/port/v1/users/me").await?;
        let client_key = user.client_key.ok_or_else(|| BrokerError::Api("no ClientKey in user response".into()))?;
        self.client_key_cache.insert(hash, client_key.clone());
        Ok(client_key)
    }

    pub async fn list_accounts(&self, access_token: &str) -> Result<Vec<Account>, BrokerError> {
        #[derive(Deserialize, Default)]
        struct Envelope {
            #[serde(rename = "Data", default)]
            data: Vec<AccountDto>,
        }
        #[derive(Deserialize)]
        struct AccountDto {
            #[serde(rename = "AccountKey")]
            account_key: String,
            #[serde(rename = "Currency")]
            currency: String,
        }
        let envelope: Envelope = self.get(access_token, "/port/v1/accounts/me").await?;
        Ok(envelope
            .data
            .into_iter()
            .map(|a| Account {
                account_key: a.account_key,
                currency: a.currency,
            })
            .collect())
    }

    pub async fn list_positions(&self, access_token: &str) -> Result<Vec<Position>, BrokerError> {
        #[derive(Deserialize, Default)]
        struct Envelope {
            #[serde(rename = "Data", default)]
            data: Vec<PositionDto>,
        }
        #[derive(Deserialize)]
        struct PositionDto {
            #[serde(rename = "PositionBase")]
            base: PositionBase,
            #[serde(rename = "PositionView")]
            view: PositionView,
            #[serde(rename = "DisplayAndFormat")]
            display: DisplayAndFormat,
        }
        #[derive(Deserialize)]
        struct PositionBase {
            #[serde(rename = "Uic")]
            uic: i64,
            #[serde(rename = "Amount")]
            amount: Decimal,
            #[serde(rename = "OpenPrice")]
            open_price: Decimal,
        }
        #[derive(Deserialize)]
        struct PositionView {
            #[serde(rename = "CurrentPrice")]
            current_price: Decimal,
            #[serde(rename = "MarketValue")]
            market_value: Decimal,
            #[serde(rename = "ProfitLossOnTrade")]
            pnl: Decimal,
        }
        #[derive(Deserialize)]
        struct DisplayAndFormat {
            #[serde(rename = "Symbol")]
            symbol: String,
            #[serde(rename = "Description")]
            description: String,
            #[serde(rename = "Currency")]
            currency: String,
        }

        let envelope: Envelope = self.get(access_token, "/port/v1/positions/me").await?;
        Ok(envelope
            .data
            .into_iter()
            .map(|p| Position {
                uic: p.base.uic,
                ticker: p.display.symbol,
                description: p.display.description,
                quantity: p.base.amount,
                average_open_price: p.base.open_price,
                current_price: p.view.current_price,
                market_value: p.view.market_value,
                pnl: p.view.pnl,
                currency: p.display.currency,
            })
            .collect())
    }

    pub async fn list_balances(&self, access_token: &str, account_key: &str) -> Result<Balance, BrokerError> {
        #[derive(Deserialize, Default)]
        struct BalanceDto {
            #[serde(rename = "CashBalance", default)]
            cash_balance: Decimal,
            #[serde(rename = "TotalValue", default)]
            total_value: Decimal,
            #[serde(rename = "Currency", default)]
            currency: String,
        }
        let path = format!("/port/v1/balances/me?AccountKey={account_key}");
        let dto: BalanceDto = self.get(access_token, &path).await?;
        Ok(Balance {
            cash_balance: dto.cash_balance,
            total_value: dto.total_value,
            currency: dto.currency,
        })
    }

    pub async fn list_orders(
        &self,
        access_token: &str,
        status_filter: Option<OrderStatus>,
    ) -> Result<Vec<PlacedOrder>, BrokerError> {
        #[derive(Deserialize, Default)]
        struct Envelope {
            #[serde(rename = "Data", default)]
            data: Vec<OrderDto>,
        }
        #[derive(Deserialize)]
        struct OrderDto {
            #[serde(rename = "OrderId")]
            order_id: String,
            #[serde(rename = "Status")]
            status: String,
        }
        let envelope: Envelope = self.get(access_token, "/port/v1/orders/me").await?;
        let mut orders: Vec<PlacedOrder> = envelope
            .data
            .into_iter()
            .map(|o| PlacedOrder {
                order_id: o.order_id,
                status: parse_order_status(&o.status),
            })
            .collect();
        if let Some(filter) = status_filter {
            orders.retain(|o| o.status == filter);
        }
        Ok(orders)
    }

    pub async fn place_order(&self, access_token: &str, request: OrderRequest) -> Result<PlacedOrder, BrokerError> {
        #[derive(Serialize)]
        struct OrderBody {
            #[serde(rename = "AccountKey")]
            account_key: String,
            #[serde(rename = "AssetType")]
            asset_type: String,
            #[serde(rename = "BuySell")]
            buy_sell: String,
            #[serde(rename = "Amount")]
            amount: Decimal,
            #[serde(rename = "OrderType")]
            order_type: String,
            #[serde(rename = "Uic")]
            uic: i64,
            #[serde(rename = "OrderDuration")]
            order_duration: serde_json::Value,
            #[serde(rename = "ManualOrder")]
            manual_order: bool,
        }
        #[derive(Deserialize, Default)]
        struct OrderResponse {
            #[serde(rename = "OrderId", default)]
            order_id: String,
        }

        let body = OrderBody {
            account_key: request.account_key,
            asset_type: request.asset_type,
            buy_sell: match request.buy_sell {
                BuySell::Buy => "Buy".to_string(),
                BuySell::Sell => "Sell".to_string(),
            },
            amount: request.amount,
            order_type: request.order_type,
            uic: request.uic,
            order_duration: serde_json::json!({ "DurationType": request.order_duration }),
            manual_order: request.manual_order,
        };

        let start = Instant::now();
        let url = format!("{}/trade/v2/orders", self.api_base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;
        let status = response.status();
        let dto: OrderResponse = handle_response(response).await?;
        let latency = start.elapsed();
        metrics::record_broker_http_call("/trade/v2/orders", status_class(status), latency.as_secs_f64());
        debug!(method = "POST", path = "/trade/v2/orders", status = status.as_u16(), latency_ms = latency.as_millis() as u64, "broker call");

        Ok(PlacedOrder {
            order_id: dto.order_id,
            status: OrderStatus::Working,
        })
    }

    pub async fn cancel_order(&self, access_token: &str, order_id: &str, account_key: &str) -> Result<(), BrokerError> {
        let start = Instant::now();
        let url = format!("{}/trade/v2/orders/{order_id}/{account_key}", self.api_base_url);
        let response = self
            .http
            .delete(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| BrokerError::Network(e.to_string()))?;
        let status = response.status();
        let result: Result<(), BrokerError> = handle_response(response).await;
        let latency = start.elapsed();
        metrics::record_broker_http_call("/trade/v2/orders", status_class(status), latency.as_secs_f64());
        debug!(method = "DELETE", path = "/trade/v2/orders", status = status.as_u16(), latency_ms = latency.as_millis() as u64, "broker call");
        result
    }

    pub async fn search_instruments(&self, access_token: &str, query: &str) -> Result<Vec<Instrument>, BrokerError> {
        #[derive(Deserialize, Default)]
        struct Envelope {
            #[serde(rename = "Data", default)]
            data: Vec<InstrumentDto>,
        }
        #[derive(Deserialize)]
        struct InstrumentDto {
            #[serde(rename = "Identifier")]
            uic: i64,
            #[serde(rename = "Symbol")]
            symbol: String,
            #[serde(rename = "Description")]
            description: String,
            #[serde(rename = "AssetType")]
            asset_type: String,
            #[serde(rename = "CurrencyCode")]
            currency: String,
        }
        let path = format!("/ref/v1/instruments?Keywords={query}");
        let envelope: Envelope = self.get(access_token, &path).await?;
        Ok(envelope
            .data
            .into_iter()
            .map(|i| Instrument {
                uic: i.uic,
                symbol: i.symbol,
                description: i.description,
                asset_type: i.asset_type,
                currency: i.currency,
            })
            .collect())
    }
}

fn parse_order_status(raw: &str) -> OrderStatus {
    match raw {
        "Working" => OrderStatus::Working,
        "Filled" => OrderStatus::Filled,
        "Cancelled" => OrderStatus::Cancelled,
        _ => OrderStatus::Rejected,
    }
}

#[async_trait]
impl TokenRefresher for BrokerSession {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord, AppError> {
        Ok(self.refresh_token(refresh_token).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> BrokerSession {
        BrokerSession::new(
            "id".into(),
            "secret".into(),
            "http://localhost/callback".into(),
            "https://sim.logonvalidation.net".into(),
            "https://gateway.saxobank.com/sim/openapi".into(),
        )
        .unwrap()
    }

    #[test]
    fn authorization_url_carries_state() {
        let session = session();
        let (url, state) = session.authorization_url("user-1");
        assert!(url.contains("response_type=code"));
        assert!(!state.is_empty());
    }

    #[test]
    fn order_status_parses_known_values() {
        assert_eq!(parse_order_status("Filled"), OrderStatus::Filled);
        assert_eq!(parse_order_status("Unknown"), OrderStatus::Rejected);
    }

    #[test]
    fn client_key_cache_is_keyed_by_token_hash() {
        let cache = ClientKeyCache::new();
        cache.insert(hash_token("tok-a"), "ck-a".into());
        assert_eq!(cache.get(hash_token("tok-a")), Some("ck-a".to_string()));
        assert_eq!(cache.get(hash_token("tok-b")), None);
    }
}
