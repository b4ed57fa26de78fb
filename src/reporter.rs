use reqwest::Client;
use tracing::{info, warn};

use crate::config::CollectorConfig;
use crate::error::ProbeResult;
use crate::gate::Verdict;

/// Destination for the session's single verdict.
pub trait VerdictSink {
    async fn deliver(&self, verdict: &Verdict) -> ProbeResult<()>;
}

/// Posts the verdict to the status collector over HTTP.
pub struct StatusReporter {
    client: Client,
    url: String,
    correlation_id: String,
}

impl StatusReporter {
    pub fn new(collector: &CollectorConfig, correlation_id: &str) -> ProbeResult<Self> {
        let client = Client::builder()
            .timeout(collector.timeout())
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            url: collector.url(),
            correlation_id: correlation_id.to_string(),
        })
    }
}

impl VerdictSink for StatusReporter {
    /// Any HTTP response counts as delivered; only transport errors fail.
    async fn deliver(&self, verdict: &Verdict) -> ProbeResult<()> {
        let body = verdict.body();
        info!(ok = body.ok, msg = %body.msg, url = %self.url, "attempting to post status");

        let resp = self
            .client
            .post(&self.url)
            .header("uuid", self.correlation_id.as_str())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        info!(%status, "response status");
        let data = resp.text().await?;
        if !data.is_empty() {
            info!(%data, "response data");
        }
        if !status.is_success() {
            warn!(%status, "collector did not accept the status");
        }
        info!("response ended");
        Ok(())
    }
}
