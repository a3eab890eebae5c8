use events::{Event, EventType};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Body of `POST /3rdparty/v1/events`.
#[derive(Debug, Deserialize)]
pub(crate) struct NotifyParams {
    pub(crate) user_id: String,
    /// Only this device instead of every device of the user.
    pub(crate) device_id: Option<String>,
    pub(crate) event: EventType,
    #[serde(default)]
    pub(crate) data: BTreeMap<String, String>,
}

impl NotifyParams {
    pub(crate) fn into_event(self) -> (String, Option<String>, Event) {
        (self.user_id, self.device_id, Event::new(self.event, self.data))
    }
}
