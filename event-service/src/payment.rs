//! Payment gateway seam.
//!
//! Production code talks to the configured gateway over HTTPS. There is no
//! simulated gateway in this module; tests provide their own double.

use alumni_shared::models::Fee;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// The payer's method was refused. User-facing.
    #[error("{0}")]
    Declined(String),
    /// The gateway could not be reached or answered unexpectedly.
    #[error("{0}")]
    Gateway(String),
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Attendance record id; the gateway deduplicates retried charges on it.
    pub idempotency_key: String,
    pub amount: u64,
    pub currency: String,
    pub payment_token: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub reference: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError>;

    /// Returns the refund reference.
    async fn refund(&self, charge_reference: &str, fee: &Fee) -> Result<String, PaymentError>;
}

#[derive(Serialize)]
struct ChargeBody<'a> {
    amount: u64,
    currency: &'a str,
    source: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct RefundBody<'a> {
    charge: &'a str,
    amount: u64,
}

#[derive(Deserialize)]
struct GatewayObject {
    id: String,
}

#[derive(Deserialize, Default)]
struct GatewayErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for a Stripe-style charges/refunds API.
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Gateway(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        idempotency_key: &str,
        body: &T,
    ) -> Result<GatewayObject, PaymentError> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Idempotency-Key", idempotency_key)
            .json(body);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::Gateway(format!("Payment gateway unreachable: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return response.json::<GatewayObject>().await.map_err(|e| {
                PaymentError::Gateway(format!("Unexpected payment gateway response: {}", e))
            });
        }

        let error_body: GatewayErrorBody = response.json().await.unwrap_or_default();
        let message = error_body
            .message
            .unwrap_or_else(|| format!("gateway returned {}", status));

        if status == StatusCode::PAYMENT_REQUIRED {
            warn!("Charge declined by gateway: {}", message);
            Err(PaymentError::Declined(message))
        } else {
            Err(PaymentError::Gateway(message))
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError> {
        debug!(
            "Charging {} {} for {}",
            request.amount, request.currency, request.idempotency_key
        );

        let body = ChargeBody {
            amount: request.amount,
            currency: &request.currency,
            source: &request.payment_token,
            description: &request.description,
        };
        let charge = self
            .post("/charges", &request.idempotency_key, &body)
            .await?;

        info!(
            "Charge {} succeeded for {}",
            charge.id, request.idempotency_key
        );
        Ok(Charge {
            reference: charge.id,
        })
    }

    async fn refund(&self, charge_reference: &str, fee: &Fee) -> Result<String, PaymentError> {
        let body = RefundBody {
            charge: charge_reference,
            amount: fee.amount,
        };
        let refund = self
            .post(
                "/refunds",
                &format!("refund-{}", charge_reference),
                &body,
            )
            .await?;

        info!("Refund {} issued for charge {}", refund.id, charge_reference);
        Ok(refund.id)
    }
}
