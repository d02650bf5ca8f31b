use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

use crate::modules::donors::Donor;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    ok: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DonorsData {
    recent_donors: Option<Vec<Donor>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopDonorSlot {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopDonors {
    #[serde(default)]
    pub today: Option<TopDonorSlot>,
    #[serde(default)]
    pub weekly: Option<TopDonorSlot>,
    #[serde(default)]
    pub monthly: Option<TopDonorSlot>,
    #[serde(default)]
    pub all_time: Option<TopDonorSlot>,
}

impl TopDonors {
    /// Leaderboard slots in display order, paired with their overlay label.
    pub fn labelled(&self) -> [(&'static str, Option<&TopDonorSlot>); 4] {
        [
            ("All-Time Top", self.all_time.as_ref()),
            ("Monthly Top", self.monthly.as_ref()),
            ("Weekly Top", self.weekly.as_ref()),
            ("Today's Top", self.today.as_ref()),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStats {
    #[serde(default)]
    pub believers_count: u64,
    #[serde(default)]
    pub big_believers_count: u64,
    #[serde(default)]
    pub top_donors: Option<TopDonors>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatsVersion {
    V1,
    V2,
}

impl StatsVersion {
    pub fn from_number(n: u8) -> Result<Self> {
        match n {
            1 => Ok(StatsVersion::V1),
            2 => Ok(StatsVersion::V2),
            other => bail!("Unsupported stats API version {}", other),
        }
    }

    fn path(&self) -> &'static str {
        match self {
            StatsVersion::V1 => "/v1/hc/widget-stats",
            StatsVersion::V2 => "/v2/hc/widget-stats",
        }
    }
}

/// Read-only view of the donation API used by the pollers.
pub trait DonationApi: Clone + Send + Sync + 'static {
    fn recent_donors(&self) -> impl Future<Output = Result<Vec<Donor>>> + Send;
    fn widget_stats(&self, version: StatsVersion)
    -> impl Future<Output = Result<WidgetStats>> + Send;
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("donorwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        if !response.status().is_success() {
            bail!("GET {}: HTTP status {}", url, response.status());
        }
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Reading body of {}", url))?;
        unwrap_envelope(&body).with_context(|| format!("Decoding {}", url))
    }
}

impl DonationApi for ApiClient {
    fn recent_donors(&self) -> impl Future<Output = Result<Vec<Donor>>> + Send {
        let api = self.clone();
        async move {
            let data: DonorsData = api.get_json("/v1/hc/donors").await?;
            data.recent_donors
                .context("Response has no recentDonors list")
        }
    }

    fn widget_stats(
        &self,
        version: StatsVersion,
    ) -> impl Future<Output = Result<WidgetStats>> + Send {
        let api = self.clone();
        async move { api.get_json(version.path()).await }
    }
}

/// Decodes `{ok, data}` and yields `data`; `ok == false` or a missing payload
/// counts as a failed fetch just like a network error.
fn unwrap_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(body).context("Malformed JSON")?;
    if !envelope.ok {
        bail!("API answered ok=false");
    }
    envelope.data.context("API response has no data")
}
