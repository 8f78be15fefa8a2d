//! Thin Stripe REST client: checkout sessions, promotion code lookup, and
//! webhook signature verification. Only the three calls the storefront needs.
use std::collections::HashMap;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Window within which a webhook timestamp is accepted, against replay.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Check a `stripe-signature` header (`t=<unix>,v1=<hex hmac>`) against
    /// the raw request body.
    pub fn verify_webhook_signature(&self, payload: &[u8], header: &str) -> Result<(), AppError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(AppError::InvalidSignature)?;
        if signatures.is_empty() {
            return Err(AppError::InvalidSignature);
        }

        if (Utc::now().timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(AppError::InvalidSignature);
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::InvalidSignature)?;
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        if signatures.iter().any(|candidate| *candidate == expected) {
            return Ok(());
        }

        Err(AppError::InvalidSignature)
    }

    pub async fn create_checkout_session(
        &self,
        params: &[(String, String)],
    ) -> Result<CheckoutSession, AppError> {
        let response = self
            .http
            .post(format!("{API_BASE}/checkout/sessions"))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(params)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Look up an active promotion code, exact match.
    pub async fn find_promotion_code(
        &self,
        code: &str,
    ) -> Result<Option<PromotionCode>, AppError> {
        let response = self
            .http
            .get(format!("{API_BASE}/promotion_codes"))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(&[("active", "true"), ("code", code), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?;

        let list: PromotionCodeList = response.json().await?;

        Ok(list.data.into_iter().next())
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct PromotionCodeList {
    data: Vec<PromotionCode>,
}

#[derive(Debug, Deserialize)]
pub struct PromotionCode {
    pub code: String,
    pub coupon: Coupon,
}

#[derive(Debug, Deserialize)]
pub struct Coupon {
    pub percent_off: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: SessionObject,
}

#[derive(Debug, Deserialize)]
pub struct SessionObject {
    pub id: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}
