use async_trait::async_trait;
use events::Event;
use std::collections::HashMap;

use crate::error::Error;

/// A push provider that delivers a batch of token-addressed events.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn open(&self) -> Result<(), Error>;

    /// Sends one batch keyed by token.
    ///
    /// `Err` means the whole batch failed. `Ok` carries the tokens that
    /// individually failed; every other token counts as delivered.
    async fn send(&self, messages: HashMap<String, Event>) -> Result<HashMap<String, Error>, Error>;

    async fn close(&self) -> Result<(), Error>;
}
