//! Consumer-facing mandate links.
//!
//! Fluvius hands out a short identifier for a data-access contract; the
//! customer opens the consumer URL built from it to grant the mandate.

use serde::{Deserialize, Serialize};

use super::fluvius::SUBSCRIPTION_KEY_HEADER;
use crate::auth::BearerToken;
use crate::config::FluviusConfig;
use crate::pipeline::PipelineError;

pub const DEFAULT_DATA_PERIOD_FROM: &str = "2023-02-01T00:00:00Z";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortUrlRequest {
    pub contract_number: String,
    pub reference_number: String,
    pub flow: String,
    pub data_period_from: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShortUrlBody<'a> {
    data_access_contract_number: &'a str,
    reference_number: &'a str,
    flow: &'a str,
    data_services: Vec<DataService<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataService<'a> {
    data_service_type: &'a str,
    data_period_from: &'a str,
}

#[derive(Deserialize)]
struct ShortUrlResponse {
    data: Option<ShortUrlData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortUrlData {
    short_url_identifier: Option<String>,
}

pub struct ShortUrlClient {
    http: reqwest::Client,
    endpoint: String,
    subscription_key: String,
    consumer_url_template: String,
    data_service_types: Vec<String>,
}

impl ShortUrlClient {
    pub fn new(http: reqwest::Client, cfg: &FluviusConfig) -> Result<Self, PipelineError> {
        let subscription_key = cfg
            .subscription_key
            .clone()
            .ok_or_else(|| PipelineError::Config("fluvius.subscription_key is not set".to_string()))?;
        Ok(Self {
            http,
            endpoint: cfg.short_url_endpoint.clone(),
            subscription_key,
            consumer_url_template: cfg.consumer_url_template.clone(),
            data_service_types: cfg.data_service_types.clone(),
        })
    }

    /// Registers the request and returns the consumer URL carrying the new identifier.
    pub async fn generate(
        &self,
        token: &BearerToken,
        request: &ShortUrlRequest,
    ) -> Result<String, PipelineError> {
        let body = ShortUrlBody {
            data_access_contract_number: &request.contract_number,
            reference_number: &request.reference_number,
            flow: &request.flow,
            data_services: self
                .data_service_types
                .iter()
                .map(|t| DataService {
                    data_service_type: t,
                    data_period_from: &request.data_period_from,
                })
                .collect(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token.as_str())
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Fetch {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ShortUrlResponse = response.json().await?;
        let id = parsed
            .data
            .and_then(|d| d.short_url_identifier)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                PipelineError::UnexpectedResponse("no shortUrlIdentifier in response".to_string())
            })?;

        Ok(self.consumer_url(&id))
    }

    fn consumer_url(&self, id: &str) -> String {
        self.consumer_url_template.replace("{id}", id)
    }
}
