use async_trait::async_trait;
use events::{Event, EventType};
use log::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::error::Error;
use crate::transport::PushTransport;

/// One entry of the upstream `POST /push` body.
#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    token: &'a str,
    event: EventType,
    data: &'a BTreeMap<String, String>,
}

/// Push transport that relays batches to an upstream gateway over HTTP.
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
}

impl Upstream {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .user_agent(concat!("sms-notify/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PushTransport for Upstream {
    async fn open(&self) -> Result<(), Error> {
        info!("Using upstream push gateway at {}", self.base_url);
        Ok(())
    }

    async fn send(&self, messages: HashMap<String, Event>) -> Result<HashMap<String, Error>, Error> {
        let mut batch: Vec<PushMessage> = messages
            .iter()
            .map(|(token, event)| PushMessage {
                token,
                event: event.event_type(),
                data: &event.data,
            })
            .collect();
        batch.sort_by(|a, b| a.token.cmp(b.token));

        let url = format!("{}/push", self.base_url);
        debug!("Posting {} push message(s) to {url}", batch.len());

        let response = self
            .client
            .post(&url)
            .json(&batch)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to send upstream push request: {e:?}");
                Error::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Upstream push gateway answered {status}: {error_text}");
            return Err(Error::provider_failed(&format!(
                "upstream push gateway answered {status}"
            )));
        }

        Ok(HashMap::new())
    }

    async fn close(&self) -> Result<(), Error> {
        info!("Closed upstream push transport");
        Ok(())
    }
}
