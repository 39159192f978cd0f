// Liveness verification: does a URL currently serve content?

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::debug;

use crate::error::PortraitError;
use crate::traits::LinkProber;

/// Why a URL was classified dead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DeadReason {
    Status { code: u16 },
    Timeout,
    Network { message: String },
    InvalidUrl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Liveness {
    Live,
    Dead(DeadReason),
}

impl Liveness {
    pub fn is_live(&self) -> bool {
        matches!(self, Liveness::Live)
    }
}

/// `HEAD`-based prober. Any 2xx is live; everything else, including
/// transport errors and timeouts, is dead.
pub struct HttpLinkProber {
    client: reqwest::Client,
}

impl HttpLinkProber {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkProber for HttpLinkProber {
    async fn probe(&self, url: &str) -> Liveness {
        let parsed = match reqwest::Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            _ => return Liveness::Dead(DeadReason::InvalidUrl),
        };

        match self.client.head(parsed).send().await {
            Ok(resp) if resp.status().is_success() => Liveness::Live,
            Ok(resp) => Liveness::Dead(DeadReason::Status {
                code: resp.status().as_u16(),
            }),
            Err(e) if e.is_timeout() => Liveness::Dead(DeadReason::Timeout),
            Err(e) => Liveness::Dead(DeadReason::Network {
                message: e.to_string(),
            }),
        }
    }
}

/// Probe one URL under a hard deadline, whatever the prober does internally.
pub async fn check(prober: &dyn LinkProber, url: &str, limit: Duration) -> Liveness {
    let liveness = match tokio::time::timeout(limit, prober.probe(url)).await {
        Ok(liveness) => liveness,
        Err(_) => {
            let err = PortraitError::LivenessTimeout(url.to_string());
            debug!(error = %err, "Treating as dead");
            Liveness::Dead(DeadReason::Timeout)
        }
    };
    debug!(url, ?liveness, "Probed candidate");
    liveness
}

/// Return the first live candidate in priority order.
///
/// Up to `concurrency` probes run at once, but results are consumed in input
/// order, so a later candidate answering first never beats an earlier live
/// one. Probes still in flight are dropped once a winner is known.
pub async fn first_live<'a>(
    prober: &dyn LinkProber,
    candidates: &'a [String],
    concurrency: usize,
    limit: Duration,
) -> Option<&'a str> {
    let mut probes = stream::iter(candidates.iter())
        .map(|url: &'a String| async move { (url.as_str(), check(prober, url, limit).await) })
        .buffered(concurrency.max(1))
        .boxed();

    while let Some((url, liveness)) = probes.next().await {
        if liveness.is_live() {
            return Some(url);
        }
    }
    None
}
