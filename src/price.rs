use crate::config::Deployment;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Prices {
    pub holyc: Option<f64>,
    pub jit: Option<f64>,
}

#[derive(Clone)]
pub struct PriceOracle {
    client: Client,
    url_template: String,
}

impl PriceOracle {
    pub fn new(url_template: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build price client")?;
        Ok(Self {
            client,
            url_template: url_template.to_string(),
        })
    }

    pub async fn prices(&self, deployment: &Deployment) -> Prices {
        let (holyc, jit) = futures::join!(
            self.usd_price(deployment.holyc),
            self.usd_price(deployment.jit)
        );
        Prices { holyc, jit }
    }

    pub async fn usd_price(&self, token: Address) -> Option<f64> {
        match self.fetch(token).await {
            Ok(Some(price)) => {
                debug!("Price for {:?}: ${}", token, price);
                Some(price)
            }
            Ok(None) => {
                warn!("No usable price for {:?}", token);
                None
            }
            Err(e) => {
                warn!("Price lookup for {:?} failed: {:#}", token, e);
                None
            }
        }
    }

    async fn fetch(&self, token: Address) -> Result<Option<f64>> {
        let url = self
            .url_template
            .replace("{token}", &token.to_checksum(None));
        let body: Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(extract_usd_price(&body))
    }
}

/// Accepts DexScreener-style `{"pairs":[{"priceUsd":"..."}]}` as well as flat
/// `{"priceUsd": ..}`, `{"price": ..}` or `{"usd": ..}` bodies.
pub fn extract_usd_price(body: &Value) -> Option<f64> {
    let candidate = body
        .get("pairs")
        .and_then(|pairs| pairs.as_array())
        .and_then(|pairs| pairs.iter().find_map(|pair| pair.get("priceUsd")))
        .or_else(|| body.get("priceUsd"))
        .or_else(|| body.get("price"))
        .or_else(|| body.get("usd"))?;

    let price = match candidate {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (price.is_finite() && price > 0.0).then_some(price)
}
