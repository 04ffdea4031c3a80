use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};

/// Reports whether the backend is currently reachable
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probes reachability with a `HEAD` request. Any HTTP response, whatever
/// its status, counts as online.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url).map_err(|_| Error::InvalidUrl(url.clone()))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_online(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                debug!("Connectivity probe got HTTP {}", response.status().as_u16());
                true
            }
            Err(e) => {
                debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}

/// Fixed connectivity flag for forced offline mode and tests
#[derive(Debug)]
pub struct StaticProbe {
    online: AtomicBool,
}

impl StaticProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
