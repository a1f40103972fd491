//! Thin HTTP wrapper over the fixed-rate orderbook venue's API (spec
//! §4.10). Built on the generic `HttpReadClient` (component C7); pagination
//! and calldata-building both reuse its retry loop. Every endpoint here is a
//! `GET` with query parameters — the venue has no JSON-body POSTs, even for
//! the calldata-building routes.

use ethers::types::{Address, U256};

use crate::{
    adapters::rate_swap::types::{
        CalldataEnvelope, CollateralsResponse, MarketSnapshot, OpenOrdersResponse, OrderbookSnapshot, RawLimitOrder,
    },
    constants::MAX_HTTP_PAGE_LIMIT,
    error::AdapterError,
    http_client::HttpReadClient,
};

#[derive(Clone)]
pub struct RateSwapClient {
    http: HttpReadClient,
    base_url: String,
}

impl RateSwapClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AdapterError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http: HttpReadClient::new(&base_url)?, base_url })
    }

    fn url(&self, path: &str, query: &str) -> String {
        format!("{}{}?{}", self.base_url, path, query)
    }

    pub async fn list_markets(&self, skip: u32, limit: u32) -> Result<Vec<MarketSnapshot>, AdapterError> {
        let limit = HttpReadClient::clamp_page_limit(limit.min(MAX_HTTP_PAGE_LIMIT));
        let url = self.url("/core/v1/markets", &format!("skip={skip}&limit={limit}"));
        Ok(self.http.get_json::<Vec<MarketSnapshot>>(&url).await?.body)
    }

    /// Pages `(skip, limit)` until a short or empty page, de-duplicating on
    /// `market_id` while preserving first-seen order (spec §4.10).
    pub async fn list_markets_all(&self) -> Result<Vec<MarketSnapshot>, AdapterError> {
        let page_size = MAX_HTTP_PAGE_LIMIT;
        let mut all = Vec::new();
        let mut skip = 0u32;
        loop {
            let batch = self.list_markets(skip, page_size).await?;
            let short = batch.len() < page_size as usize;
            all.extend(batch);
            if short {
                break;
            }
            skip += page_size;
        }

        let mut seen = std::collections::HashSet::new();
        Ok(all.into_iter().filter(|m| seen.insert(m.market_id)).collect())
    }

    pub async fn get_market(&self, market_id: u32) -> Result<MarketSnapshot, AdapterError> {
        let url = self.url("/core/v1/markets", &format!("marketId={market_id}"));
        self.http.get_plain(&url).await
    }

    pub async fn get_orderbook(&self, market_id: u32, tick_size: f64) -> Result<OrderbookSnapshot, AdapterError> {
        let url = self.url(&format!("/core/v1/order-books/{market_id}"), &format!("tickSize={tick_size}"));
        self.http.get_plain(&url).await
    }

    pub async fn get_collaterals(
        &self,
        user_address: Address,
        account_id: u8,
    ) -> Result<CollateralsResponse, AdapterError> {
        let url = self.url(
            "/core/v1/collaterals/summary",
            &format!("userAddress={user_address:#x}&accountId={account_id}"),
        );
        self.http.get_plain(&url).await
    }

    /// The user's open limit orders (spec §4.10, mirroring the venue's
    /// `get_open_orders` PnL endpoint).
    pub async fn get_open_orders(&self, user_address: Address, limit: u32) -> Result<Vec<RawLimitOrder>, AdapterError> {
        let limit = HttpReadClient::clamp_page_limit(limit.min(MAX_HTTP_PAGE_LIMIT));
        let url = self.url("/core/v1/pnl/limit-orders", &format!("userAddress={user_address:#x}&limit={limit}"));
        Ok(self.http.get_plain::<OpenOrdersResponse>(&url).await?.orders)
    }

    pub async fn build_deposit_calldata(
        &self,
        token_id: u16,
        amount_native: U256,
        market_id: u32,
        user_address: Address,
        account_id: u8,
    ) -> Result<CalldataEnvelope, AdapterError> {
        let url = self.url(
            "/core/v2/calldata/deposit",
            &format!(
                "userAddress={user_address:#x}&accountId={account_id}&tokenId={token_id}&amount={amount_native}&marketId={market_id}"
            ),
        );
        self.http.get_plain(&url).await
    }

    pub async fn build_withdraw_calldata(
        &self,
        token_id: u16,
        amount_native: U256,
        user_address: Address,
        account_id: u8,
    ) -> Result<CalldataEnvelope, AdapterError> {
        let url = self.url(
            "/core/v1/calldata/withdraw/request",
            &format!("userAddress={user_address:#x}&accountId={account_id}&tokenId={token_id}&amount={amount_native}"),
        );
        self.http.get_plain(&url).await
    }

    pub async fn build_cash_transfer_calldata(
        &self,
        user_address: Address,
        market_id: u32,
        amount_wei: U256,
        is_deposit: bool,
    ) -> Result<CalldataEnvelope, AdapterError> {
        let url = self.url(
            "/core/v3/calldata/cash-transfer",
            &format!("userAddress={user_address:#x}&marketId={market_id}&isDeposit={is_deposit}&amount={amount_wei}"),
        );
        self.http.get_plain(&url).await
    }

    pub async fn build_place_order_calldata(
        &self,
        market_acc: &str,
        market_id: u32,
        side: u8,
        size_wei: U256,
        limit_tick: i64,
        tif: u8,
        slippage: f64,
    ) -> Result<CalldataEnvelope, AdapterError> {
        let url = self.url(
            "/core/v4/calldata/place-order",
            &format!(
                "marketAcc={market_acc}&marketId={market_id}&side={side}&size={size_wei}&limitTick={limit_tick}&tif={tif}&slippage={slippage}"
            ),
        );
        self.http.get_plain(&url).await
    }

    pub async fn build_close_position_calldata(
        &self,
        market_acc: &str,
        market_id: u32,
        side: u8,
        size_wei: U256,
        limit_tick: i64,
        tif: u8,
    ) -> Result<CalldataEnvelope, AdapterError> {
        let url = self.url(
            "/core/v4/calldata/close-active-position",
            &format!(
                "marketAcc={market_acc}&marketId={market_id}&side={side}&size={size_wei}&limitTick={limit_tick}&tif={tif}"
            ),
        );
        self.http.get_plain(&url).await
    }

    pub async fn build_cancel_order_calldata(
        &self,
        market_acc: &str,
        market_id: u32,
        order_ids: Option<&[String]>,
        cancel_all: bool,
    ) -> Result<CalldataEnvelope, AdapterError> {
        let mut query = format!("marketAcc={market_acc}&marketId={market_id}&cancelAll={cancel_all}");
        if let Some(ids) = order_ids {
            if !cancel_all && !ids.is_empty() {
                query.push_str(&format!("&orderIds={}", ids.join(",")));
            }
        }
        let url = self.url("/core/v3/calldata/cancel-order", &query);
        self.http.get_plain(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn list_markets_all_dedupes_and_stops_on_short_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/core/v1/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": 1, "symbol": "A"}, {"id": 2, "symbol": "B"}],
                "pagination": {"next": null},
            })))
            .mount(&server)
            .await;

        let client = RateSwapClient::new(server.uri()).unwrap();
        let markets = client.list_markets_all().await.unwrap();
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[0].market_id, 1);
    }

    #[tokio::test]
    async fn get_open_orders_accepts_results_alias() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/core/v1/pnl/limit-orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"orderId": "42", "marketId": 3, "side": 0, "limitTick": 100, "tickStep": 1, "size": "1000000000000000000", "filledSize": "0", "status": "open"}],
            })))
            .mount(&server)
            .await;

        let client = RateSwapClient::new(server.uri()).unwrap();
        let user: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let orders = client.get_open_orders(user, 50).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn get_market_decodes_plain_shape() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/core/v1/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 7,
                "symbol": "USDC-DEC26",
            })))
            .mount(&server)
            .await;

        let client = RateSwapClient::new(server.uri()).unwrap();
        let market = client.get_market(7).await.unwrap();
        assert_eq!(market.market_id, 7);
    }
}
