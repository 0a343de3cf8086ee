use meter_domain::ReadingBatch;
use reqwest::StatusCode;
use serde::Serialize;

use crate::auth::BearerToken;
use crate::config::OpinumConfig;
use crate::pipeline::{PipelineError, Sink};

#[derive(Serialize)]
struct PushSeries<'a> {
    #[serde(rename = "variableId")]
    variable_id: i64,
    data: Vec<PushPoint<'a>>,
}

#[derive(Serialize)]
struct PushPoint<'a> {
    date: &'a str,
    value: f64,
}

/// Opinum push API. Each batch goes out as one request; only 200 and 201 count as accepted.
pub struct OpinumSink {
    http: reqwest::Client,
    push_url: String,
    push_scope: String,
}

impl OpinumSink {
    pub fn new(http: reqwest::Client, cfg: &OpinumConfig) -> Self {
        Self {
            http,
            push_url: cfg.push_url.clone(),
            push_scope: cfg.push_scope.clone(),
        }
    }
}

fn push_body(batch: &ReadingBatch) -> [PushSeries<'_>; 1] {
    [PushSeries {
        variable_id: batch.variable_id(),
        data: batch
            .readings()
            .iter()
            .map(|r| PushPoint {
                date: r.timestamp(),
                value: r.value(),
            })
            .collect(),
    }]
}

#[async_trait::async_trait]
impl Sink for OpinumSink {
    async fn deliver(&self, token: &BearerToken, batch: ReadingBatch) -> Result<(), PipelineError> {
        let response = self
            .http
            .post(&self.push_url)
            .bearer_auth(token.as_str())
            .header("scope", &self.push_scope)
            .json(&push_body(&batch))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            metrics::counter!("opinum_delivery_failed_total").increment(1);
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Delivery {
                status: status.as_u16(),
                body,
            });
        }

        metrics::counter!("opinum_delivered_readings_total").increment(batch.len() as u64);
        tracing::debug!(variable_id = batch.variable_id(), count = batch.len(), "data sent to Opinum");
        Ok(())
    }
}
