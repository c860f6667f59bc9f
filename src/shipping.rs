//! Shipping rate resolver over a RajaOngkir-style provider.
//!
//! Every call goes through the same request/normalize pipeline: the provider
//! wraps both success and failure in a `rajaongkir` envelope with an embedded
//! status code, and transport failures are possible on top of that. All three
//! failure shapes (missing wrapper, embedded non-200 status, network error)
//! collapse into `StoreError::ShippingUnavailable`; callers never see the
//! transport layer. No automatic retry is performed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ShippingConfig;
use crate::error::{Result, StoreError};

/// Carriers the store ships with. Requests naming anything else are rejected
/// before a provider call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Courier {
    Jne,
    Pos,
    Tiki,
}

impl Courier {
    pub fn code(self) -> &'static str {
        match self {
            Self::Jne => "jne",
            Self::Pos => "pos",
            Self::Tiki => "tiki",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Jne => "Jalur Nugraha Ekakurir (JNE)",
            Self::Pos => "POS Indonesia",
            Self::Tiki => "Citra Van Titipan Kilat (TIKI)",
        }
    }
}

impl std::str::FromStr for Courier {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jne" => Ok(Self::Jne),
            "pos" => Ok(Self::Pos),
            "tiki" => Ok(Self::Tiki),
            other => Err(StoreError::Validation(format!("unsupported courier: {other}"))),
        }
    }
}

/// One courier service offering. Transient: regenerated per request, never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ShippingQuote {
    pub courier: String,
    pub courier_name: String,
    pub service: String,
    pub description: String,
    pub cost: Decimal,
    pub etd: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Province {
    pub province_id: String,
    pub province: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct City {
    pub city_id: String,
    pub province_id: String,
    pub province: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub city_name: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Subdistrict {
    pub subdistrict_id: String,
    pub city_id: String,
    pub subdistrict_name: String,
}

#[derive(Debug, Deserialize)]
struct RateResult {
    code: String,
    name: String,
    costs: Vec<RateService>,
}

#[derive(Debug, Deserialize)]
struct RateService {
    service: String,
    description: String,
    cost: Vec<RateCost>,
}

#[derive(Debug, Deserialize)]
struct RateCost {
    value: i64,
    etd: String,
}

#[derive(Debug, Clone)]
pub struct RateClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    origin_city_id: u32,
}

impl RateClient {
    pub fn new(config: &ShippingConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            origin_city_id: config.origin_city_id,
        })
    }

    pub fn origin_city_id(&self) -> u32 {
        self.origin_city_id
    }

    /// Rate quotes for shipping `weight_grams` from the configured origin to
    /// `destination_id` with the given courier.
    pub async fn get_rates(
        &self,
        destination_id: u32,
        weight_grams: i32,
        courier: Courier,
    ) -> Result<Vec<ShippingQuote>> {
        if weight_grams < 1 {
            return Err(StoreError::Validation("weight must be at least 1 gram".into()));
        }
        let form = [
            ("origin", self.origin_city_id.to_string()),
            ("originType", "city".to_string()),
            ("destination", destination_id.to_string()),
            ("destinationType", "subdistrict".to_string()),
            ("weight", weight_grams.to_string()),
            ("courier", courier.code().to_string()),
        ];
        let results = self.post_form("/cost", &form).await.map_err(|e| {
            tracing::error!(
                destination_id,
                weight_grams,
                courier = courier.code(),
                error = %e,
                "rate lookup failed"
            );
            e
        })?;
        flatten_rates(results)
    }

    pub async fn provinces(&self) -> Result<Vec<Province>> {
        let results = self.get("/province", &[]).await?;
        deserialize_results(results)
    }

    pub async fn cities(&self, province_id: Option<u32>) -> Result<Vec<City>> {
        let params: Vec<(&str, String)> = province_id
            .map(|id| vec![("province", id.to_string())])
            .unwrap_or_default();
        let results = self.get("/city", &params).await?;
        deserialize_results(results)
    }

    pub async fn subdistricts(&self, city_id: u32) -> Result<Vec<Subdistrict>> {
        let results = self.get("/subdistrict", &[("city", city_id.to_string())]).await?;
        deserialize_results(results)
    }

    /// Waybill lookup; the provider's result shape varies per courier, so it
    /// is passed through as-is once the envelope checks out.
    pub async fn track(&self, waybill: &str, courier: Courier) -> Result<Value> {
        let form = [
            ("waybill", waybill.to_string()),
            ("courier", courier.code().to_string()),
        ];
        self.post_form("/waybill", &form).await
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("key", &self.api_key)
            .query(params)
            .send()
            .await
            .map_err(transport_error(path))?;
        let body: Value = response.json().await.map_err(transport_error(path))?;
        unwrap_envelope(body)
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("key", &self.api_key)
            .form(form)
            .send()
            .await
            .map_err(transport_error(path))?;
        let body: Value = response.json().await.map_err(transport_error(path))?;
        unwrap_envelope(body)
    }
}

fn transport_error(path: &str) -> impl FnOnce(reqwest::Error) -> StoreError + '_ {
    move |e| {
        tracing::error!(endpoint = path, error = %e, "shipping provider request failed");
        StoreError::ShippingUnavailable("could not reach the shipping provider".into())
    }
}

/// Validates the provider envelope and extracts `results`. A missing wrapper
/// key or an embedded non-200 status both normalize to `ShippingUnavailable`,
/// keeping the provider's description when it sent one.
fn unwrap_envelope(body: Value) -> Result<Value> {
    let Some(envelope) = body.get("rajaongkir") else {
        return Err(StoreError::ShippingUnavailable(
            "malformed response from shipping provider".into(),
        ));
    };
    let code = envelope
        .pointer("/status/code")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if code != 200 {
        let description = envelope
            .pointer("/status/description")
            .and_then(Value::as_str)
            .unwrap_or("shipping provider rejected the request");
        return Err(StoreError::ShippingUnavailable(description.to_string()));
    }
    Ok(envelope.get("results").cloned().unwrap_or(Value::Array(vec![])))
}

fn deserialize_results<T: serde::de::DeserializeOwned>(results: Value) -> Result<Vec<T>> {
    serde_json::from_value(results).map_err(|e| {
        tracing::error!(error = %e, "unexpected result shape from shipping provider");
        StoreError::ShippingUnavailable("malformed response from shipping provider".into())
    })
}

/// Flattens the nested courier/service/cost tiers of a `/cost` response into
/// one quote per service.
fn flatten_rates(results: Value) -> Result<Vec<ShippingQuote>> {
    let couriers: Vec<RateResult> = deserialize_results(results)?;
    let quotes = couriers
        .into_iter()
        .flat_map(|courier| {
            let code = courier.code;
            let name = courier.name;
            courier
                .costs
                .into_iter()
                .filter_map(move |service| {
                    let tier = service.cost.into_iter().next()?;
                    Some(ShippingQuote {
                        courier: code.clone(),
                        courier_name: name.clone(),
                        service: service.service,
                        description: service.description,
                        cost: Decimal::from(tier.value),
                        etd: tier.etd,
                    })
                })
        })
        .collect();
    Ok(quotes)
}
