use meter_domain::{MeteringPoint, TimeWindow};
use reqwest::StatusCode;

use crate::auth::BearerToken;
use crate::config::FluviusConfig;
use crate::pipeline::{PipelineError, Source};
use crate::transform::RawPayload;

pub(crate) const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Quarter-hour readings from the Fluvius mandate energy endpoint.
///
/// One GET per metering point and window; no pagination, no retry. Only 200 counts as a fetched payload.
pub struct FluviusSource {
    http: reqwest::Client,
    readings_url: String,
    identifier_param: String,
    period_type: String,
    granularity: String,
    subscription_key: String,
}

impl FluviusSource {
    pub fn new(http: reqwest::Client, cfg: &FluviusConfig) -> Result<Self, PipelineError> {
        let subscription_key = cfg
            .subscription_key
            .clone()
            .ok_or_else(|| PipelineError::Config("fluvius.subscription_key is not set".to_string()))?;
        Ok(Self {
            http,
            readings_url: cfg.readings_url.clone(),
            identifier_param: cfg.identifier_param.clone(),
            period_type: cfg.period_type.clone(),
            granularity: cfg.granularity.clone(),
            subscription_key,
        })
    }
}

#[async_trait::async_trait]
impl Source for FluviusSource {
    async fn fetch(
        &self,
        token: &BearerToken,
        point: &MeteringPoint,
        window: &TimeWindow,
    ) -> Result<RawPayload, PipelineError> {
        let (from, to) = window.rfc3339_bounds()?;
        let query = [
            (self.identifier_param.as_str(), point.ean.as_str()),
            ("PeriodType", self.period_type.as_str()),
            ("granularity", self.granularity.as_str()),
            ("from", from.as_str()),
            ("to", to.as_str()),
        ];

        metrics::counter!("fluvius_fetch_total").increment(1);
        let response = self
            .http
            .get(&self.readings_url)
            .bearer_auth(token.as_str())
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            metrics::counter!("fluvius_fetch_failed_total").increment(1);
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Fetch {
                status: status.as_u16(),
                body,
            });
        }

        let payload: RawPayload = response.json().await?;
        tracing::debug!(ean = %point.ean, %from, %to, "Fluvius data retrieved");
        Ok(payload)
    }
}
