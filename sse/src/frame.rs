use bytes::Bytes;
use events::Event;

use crate::error::Error;

/// Comment frame written on connect and on every keepalive tick.
pub const KEEPALIVE: &[u8] = b":keepalive\n\n";

/// One queued event, already serialized. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event_type: String,
    pub payload: Bytes,
}

impl Frame {
    pub fn from_event(event: &Event) -> Result<Self, Error> {
        let payload = serde_json::to_vec(event)?;
        Ok(Self {
            event_type: event.event_type().to_string(),
            payload: Bytes::from(payload),
        })
    }

    /// Encodes the frame as `event: <type>\ndata: <json>\n\n`.
    pub fn encode(&self) -> Bytes {
        let mut buffer =
            Vec::with_capacity(self.event_type.len() + self.payload.len() + "event: \ndata: \n\n".len());
        buffer.extend_from_slice(b"event: ");
        buffer.extend_from_slice(self.event_type.as_bytes());
        buffer.extend_from_slice(b"\ndata: ");
        buffer.extend_from_slice(&self.payload);
        buffer.extend_from_slice(b"\n\n");
        Bytes::from(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn encodes_event_line_and_json_data_line() {
        let frame = Frame::from_event(&Event::message_enqueued()).unwrap();
        assert_eq!(
            frame.encode(),
            Bytes::from_static(
                b"event: MessageEnqueued\ndata: {\"event\":\"MessageEnqueued\",\"data\":{}}\n\n"
            )
        );
    }

    #[test]
    fn multiline_values_stay_on_one_data_line() {
        let mut data = BTreeMap::new();
        data.insert("note".to_string(), "line one\nline two".to_string());
        let event = Event::new(events::EventType::SettingsUpdated, data);

        let encoded = Frame::from_event(&event).unwrap().encode();
        let text = std::str::from_utf8(&encoded).unwrap();

        assert_eq!(text.matches('\n').count(), 3);
        assert!(text.contains(r#""note":"line one\nline two""#));
    }
}
