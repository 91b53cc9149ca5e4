//! CoinGecko data source.
//!
//! Pages through `/coins/markets` (250 coins per page, up to 5 pages, one
//! second apart) on a background thread and streams each page over a
//! channel. No retries: a failed page ends the stream and the next refresh
//! tick tries again.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use super::{DataSource, SourceError};
use crate::coin::{ChartPoint, ChartRange, CoinRecord, GlobalSummary, Page};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const PER_PAGE: u32 = 250;
const MAX_PAGES: u32 = 5;
const PAGE_DELAY: Duration = Duration::from_secs(1);

/// `/coins/markets` row.
#[derive(Debug, Deserialize)]
struct MarketItem {
    id: String,
    symbol: String,
    name: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    market_cap_rank: Option<u32>,
    total_volume: Option<f64>,
    circulating_supply: Option<f64>,
    total_supply: Option<f64>,
    last_updated: Option<String>,
    price_change_percentage_1h_in_currency: Option<f64>,
    price_change_percentage_24h_in_currency: Option<f64>,
    price_change_percentage_7d_in_currency: Option<f64>,
    price_change_percentage_30d_in_currency: Option<f64>,
    price_change_percentage_1y_in_currency: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: GlobalData,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    active_cryptocurrencies: Option<u64>,
    markets: Option<u64>,
    #[serde(default)]
    total_market_cap: HashMap<String, f64>,
    #[serde(default)]
    total_volume: HashMap<String, f64>,
    #[serde(default)]
    market_cap_percentage: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    id: String,
    symbol: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
}

/// CoinGecko v3 public API source.
pub struct CoinGeckoSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl CoinGeckoSource {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("coinsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn markets_url(base: &str, currency: &str, page: u32) -> String {
        format!(
            "{base}/coins/markets?vs_currency={}&order=market_cap_desc\
             &per_page={PER_PAGE}&page={page}&sparkline=false\
             &price_change_percentage=1h,24h,7d,30d,1y",
            vs_currency(currency)
        )
    }

    fn chart_url(base: &str, id: &str, currency: &str, days: &str) -> String {
        format!(
            "{base}/coins/{id}/market_chart?vs_currency={}&days={days}",
            vs_currency(currency)
        )
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        client: &reqwest::blocking::Client,
        url: &str,
    ) -> Result<T, SourceError> {
        let resp = client
            .get(url)
            .send()
            .map_err(|e| SourceError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                endpoint: endpoint_of(url),
            });
        }

        resp.json().map_err(|e| {
            SourceError::ResponseFormatChanged(format!("{}: {e}", endpoint_of(url)))
        })
    }

    fn fetch_page(
        client: &reqwest::blocking::Client,
        base: &str,
        currency: &str,
        page: u32,
    ) -> Result<Page, SourceError> {
        let items: Vec<MarketItem> = Self::get_json(client, &Self::markets_url(base, currency, page))?;
        Ok(Self::parse_markets(items))
    }

    fn parse_markets(items: Vec<MarketItem>) -> Page {
        items
            .into_iter()
            .map(|item| {
                let available_supply = item.circulating_supply.unwrap_or(0.0);
                let total_supply = match item.total_supply {
                    Some(t) if t > 0.0 => t,
                    _ => available_supply,
                };

                CoinRecord {
                    id: item.id,
                    name: item.name,
                    symbol: item.symbol.to_uppercase(),
                    rank: item.market_cap_rank.unwrap_or(0),
                    price: item.current_price.unwrap_or(0.0),
                    volume_24h: item.total_volume.unwrap_or(0.0),
                    market_cap: item.market_cap.unwrap_or(0.0),
                    available_supply,
                    total_supply,
                    percent_change_1h: item.price_change_percentage_1h_in_currency.unwrap_or(0.0),
                    percent_change_24h: item.price_change_percentage_24h_in_currency.unwrap_or(0.0),
                    percent_change_7d: item.price_change_percentage_7d_in_currency.unwrap_or(0.0),
                    percent_change_30d: item.price_change_percentage_30d_in_currency.unwrap_or(0.0),
                    percent_change_1y: item.price_change_percentage_1y_in_currency.unwrap_or(0.0),
                    last_updated: item.last_updated.unwrap_or_default(),
                }
            })
            .collect()
    }

    fn parse_global(resp: GlobalResponse, currency: &str) -> GlobalSummary {
        let cur = vs_currency(currency);
        let data = resp.data;
        GlobalSummary {
            total_market_cap: data.total_market_cap.get(&cur).copied().unwrap_or(0.0),
            total_volume_24h: data.total_volume.get(&cur).copied().unwrap_or(0.0),
            btc_dominance: data.market_cap_percentage.get("btc").copied().unwrap_or(0.0),
            active_currencies: data.active_cryptocurrencies.unwrap_or(0),
            active_assets: 0,
            active_markets: data.markets.unwrap_or(0),
        }
    }

    /// Resolve a user-supplied name or symbol to a CoinGecko id.
    fn resolve_id(&self, name: &str) -> Result<String, SourceError> {
        let list: Vec<ListItem> =
            Self::get_json(&self.client, &format!("{}/coins/list", self.base_url))?;
        Ok(Self::match_id(&list, name).unwrap_or_else(|| name_to_slug(name)))
    }

    fn match_id(list: &[ListItem], name: &str) -> Option<String> {
        let wanted = name.trim();
        list.iter()
            .find(|item| item.id.eq_ignore_ascii_case(wanted) || item.name.eq_ignore_ascii_case(wanted))
            .or_else(|| list.iter().find(|item| item.symbol.eq_ignore_ascii_case(wanted)))
            .map(|item| item.id.clone())
    }
}

impl DataSource for CoinGeckoSource {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn fetch_all_pages(&self, currency: &str) -> Result<Receiver<Page>, SourceError> {
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        let base = self.base_url.clone();
        let currency = currency.to_string();

        thread::Builder::new()
            .name("coingecko-pages".into())
            .spawn(move || {
                for page in 1..=MAX_PAGES {
                    if page > 1 {
                        thread::sleep(PAGE_DELAY);
                    }
                    match Self::fetch_page(&client, &base, &currency, page) {
                        Ok(coins) => {
                            if coins.is_empty() || tx.send(coins).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(page, error = %e, "coingecko page fetch failed, ending stream");
                            return;
                        }
                    }
                }
            })
            .map_err(|e| SourceError::Other(format!("failed to spawn page fetcher: {e}")))?;

        Ok(rx)
    }

    fn fetch_global_summary(&self, currency: &str) -> Result<GlobalSummary, SourceError> {
        let resp: GlobalResponse =
            Self::get_json(&self.client, &format!("{}/global", self.base_url))?;
        Ok(Self::parse_global(resp, currency))
    }

    fn fetch_price(&self, name: &str, currency: &str) -> Result<f64, SourceError> {
        let id = self.resolve_id(name)?;
        let cur = vs_currency(currency);
        let url = format!("{}/simple/price?ids={id}&vs_currencies={cur}", self.base_url);
        let prices: HashMap<String, HashMap<String, f64>> = Self::get_json(&self.client, &url)?;

        prices
            .get(&id)
            .and_then(|by_cur| by_cur.get(&cur))
            .copied()
            .ok_or_else(|| SourceError::NotFound {
                name: name.to_string(),
            })
    }

    fn fetch_chart(
        &self,
        name: &str,
        currency: &str,
        range: ChartRange,
    ) -> Result<Vec<ChartPoint>, SourceError> {
        let days = range
            .days(chrono::Utc::now().date_naive())
            .map(|d| d.to_string())
            .unwrap_or_else(|| "max".into());
        let id = self.resolve_id(name)?;
        let url = Self::chart_url(&self.base_url, &id, currency, &days);
        let chart: MarketChart = Self::get_json(&self.client, &url).map_err(|e| match e {
            SourceError::HttpStatus { status: 404, .. } => SourceError::NotFound {
                name: name.to_string(),
            },
            other => other,
        })?;

        Ok(chart
            .prices
            .into_iter()
            .map(|(ts, value)| ChartPoint {
                timestamp_ms: ts as i64,
                value,
            })
            .collect())
    }
}

/// CoinGecko wants lowercase currency codes and defaults to USD.
fn vs_currency(currency: &str) -> String {
    let c = currency.trim().to_lowercase();
    if c.is_empty() {
        "usd".into()
    } else {
        c
    }
}

/// "Bitcoin Cash" -> "bitcoin-cash"
fn name_to_slug(name: &str) -> String {
    name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}

fn endpoint_of(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_markets_page() {
        let json = r#"[
            {"id":"bitcoin","symbol":"btc","name":"Bitcoin","current_price":64000.5,
             "market_cap":1.2e12,"market_cap_rank":1,"total_volume":3.0e10,
             "circulating_supply":19000000.0,"total_supply":21000000.0,
             "last_updated":"2024-03-01T12:00:00.000Z",
             "price_change_percentage_1h_in_currency":0.1,
             "price_change_percentage_24h_in_currency":-1.5,
             "price_change_percentage_7d_in_currency":4.0,
             "price_change_percentage_30d_in_currency":null,
             "price_change_percentage_1y_in_currency":120.0},
            {"id":"weird","symbol":"wrd","name":"Weird","current_price":null,
             "market_cap":null,"market_cap_rank":null,"total_volume":null,
             "circulating_supply":500.0,"total_supply":null,"last_updated":null}
        ]"#;
        let items: Vec<MarketItem> = serde_json::from_str(json).unwrap();
        let page = CoinGeckoSource::parse_markets(items);

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].symbol, "BTC");
        assert_eq!(page[0].rank, 1);
        assert_eq!(page[0].percent_change_24h, -1.5);
        assert_eq!(page[0].percent_change_30d, 0.0);
        // total supply falls back to circulating supply
        assert_eq!(page[1].total_supply, 500.0);
        assert_eq!(page[1].price, 0.0);
        assert_eq!(page[1].last_updated, "");
    }

    #[test]
    fn parses_global_for_currency() {
        let json = r#"{"data":{"active_cryptocurrencies":12000,"markets":900,
            "total_market_cap":{"usd":2.5e12,"eur":2.3e12},
            "total_volume":{"usd":9.0e10,"eur":8.0e10},
            "market_cap_percentage":{"btc":51.2,"eth":17.0}}}"#;
        let resp: GlobalResponse = serde_json::from_str(json).unwrap();
        let summary = CoinGeckoSource::parse_global(resp, "EUR");

        assert_eq!(summary.total_market_cap, 2.3e12);
        assert_eq!(summary.total_volume_24h, 8.0e10);
        assert_eq!(summary.btc_dominance, 51.2);
        assert_eq!(summary.active_markets, 900);
    }

    #[test]
    fn unknown_currency_gives_empty_summary() {
        let json = r#"{"data":{"total_market_cap":{"usd":1.0}}}"#;
        let resp: GlobalResponse = serde_json::from_str(json).unwrap();
        assert!(CoinGeckoSource::parse_global(resp, "xyz").is_empty());
    }

    #[test]
    fn match_id_prefers_name_over_symbol() {
        let list = vec![
            ListItem { id: "eth-clone".into(), symbol: "ethereum".into(), name: "Clone".into() },
            ListItem { id: "ethereum".into(), symbol: "eth".into(), name: "Ethereum".into() },
        ];
        assert_eq!(CoinGeckoSource::match_id(&list, "Ethereum").as_deref(), Some("ethereum"));
        assert_eq!(CoinGeckoSource::match_id(&list, "ETH").as_deref(), Some("ethereum"));
        assert_eq!(CoinGeckoSource::match_id(&list, "nope"), None);
    }

    #[test]
    fn chart_uses_resolved_id() {
        let list = vec![
            ListItem { id: "bnb-bridged".into(), symbol: "wbnb".into(), name: "Wrapped BNB".into() },
            ListItem { id: "binancecoin".into(), symbol: "bnb".into(), name: "BNB".into() },
        ];
        let id = CoinGeckoSource::match_id(&list, "BNB").unwrap();
        assert_eq!(id, "binancecoin");
        assert_ne!(id, name_to_slug("BNB"));

        let url = CoinGeckoSource::chart_url(BASE_URL, &id, "EUR", "30");
        assert!(url.contains("/coins/binancecoin/market_chart"));
        assert!(url.contains("vs_currency=eur&days=30"));
    }

    #[test]
    fn url_helpers() {
        assert_eq!(name_to_slug("Bitcoin  Cash"), "bitcoin-cash");
        assert_eq!(vs_currency(""), "usd");
        assert_eq!(vs_currency("EUR"), "eur");
        let url = CoinGeckoSource::markets_url(BASE_URL, "USD", 2);
        assert!(url.contains("vs_currency=usd"));
        assert!(url.contains("page=2"));
        assert_eq!(endpoint_of(&url), format!("{BASE_URL}/coins/markets"));
    }
}
