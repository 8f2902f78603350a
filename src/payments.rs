// ABOUTME: Payment processor seam and its Stripe implementation for mobile payment sheets
// ABOUTME: Creates a customer, an ephemeral key, and a payment intent; nothing is persisted locally

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

use crate::types::PaymentSheetResponse;

pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
pub const DEFAULT_STRIPE_API_VERSION: &str = "2025-04-30.basil";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("transport failure calling {endpoint}: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered {status}: {message}")]
    Rejected {
        endpoint: &'static str,
        status: StatusCode,
        message: String,
    },

    #[error("{endpoint} returned no {field}")]
    MissingField {
        endpoint: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSheetParams {
    pub email: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_sheet(
        &self,
        params: &PaymentSheetParams,
    ) -> Result<PaymentSheetResponse, PaymentError>;
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub publishable_key: String,
    pub api_version: String,
    pub api_base: String,
}

pub struct StripeClient {
    config: StripeConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Customer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EphemeralKey {
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(PaymentError::Client)?;

        Ok(Self {
            config: StripeConfig {
                api_base: config.api_base.trim_end_matches('/').to_string(),
                ..config
            },
            http,
        })
    }

    async fn post<T>(
        &self,
        endpoint: &'static str,
        form: &[(&str, &str)],
        api_version: Option<&str>,
    ) -> Result<T, PaymentError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/v1/{endpoint}", self.config.api_base);
        let mut request = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(form);
        if let Some(version) = api_version {
            request = request.header("Stripe-Version", version);
        }

        let response = request
            .send()
            .await
            .map_err(|source| PaymentError::Transport { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| "no error message".to_string());
            return Err(PaymentError::Rejected {
                endpoint,
                status,
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| PaymentError::Transport { endpoint, source })
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    #[instrument(skip(self, params), fields(amount = params.amount_minor, currency = %params.currency))]
    async fn create_payment_sheet(
        &self,
        params: &PaymentSheetParams,
    ) -> Result<PaymentSheetResponse, PaymentError> {
        let customer: Customer = self
            .post("customers", &[("email", params.email.as_str())], None)
            .await?;

        let ephemeral_key: EphemeralKey = self
            .post(
                "ephemeral_keys",
                &[("customer", customer.id.as_str())],
                Some(&self.config.api_version),
            )
            .await?;

        let amount = params.amount_minor.to_string();
        let intent: PaymentIntent = self
            .post(
                "payment_intents",
                &[
                    ("amount", amount.as_str()),
                    ("currency", params.currency.as_str()),
                    ("customer", customer.id.as_str()),
                    ("automatic_payment_methods[enabled]", "true"),
                ],
                None,
            )
            .await?;

        tracing::info!(customer = %customer.id, "created payment intent");

        Ok(PaymentSheetResponse {
            payment_intent: intent.client_secret.ok_or(PaymentError::MissingField {
                endpoint: "payment_intents",
                field: "client_secret",
            })?,
            ephemeral_key: ephemeral_key.secret.ok_or(PaymentError::MissingField {
                endpoint: "ephemeral_keys",
                field: "secret",
            })?,
            customer: customer.id,
            publishable_key: self.config.publishable_key.clone(),
        })
    }
}
