// Named events carried by the hub.
//
// Two layers:
// - `Envelope`: what the hub actually relays. An event name plus an arbitrary
//   JSON payload. The hub never inspects or rewrites it, so clients can add
//   event kinds without touching the relay.
// - `DashboardEvent`: the typed vocabulary the dashboard and the station
//   finder speak. Converting to an envelope is infallible; converting back
//   can fail on an unknown name or a payload of the wrong shape, and callers
//   treat that as "not for me" and skip it.
//
// Payload field names (`loc`, `userId`, `userIds`, ...) are fixed by the
// viewers already listening on the hub and must not be renamed.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

pub const LOCATION: &str = "location";
pub const FILTERED_LOCATIONS: &str = "filteredlocations";
pub const TIMER_UPDATE: &str = "timerUpdate";
pub const CHARGE_NOW: &str = "chargeNow";
pub const CHARGE_NOW_MULTIPLE: &str = "chargeNowMultiple";

/// A named event exactly as relayed by the hub.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    pub payload: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Why an envelope could not be read as a `DashboardEvent`.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    #[error("malformed `{event}` payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The dashboard's event vocabulary.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum DashboardEvent {
    /// Ask the station finder for a station near `loc`.
    #[serde(rename = "location")]
    Location { loc: String },
    /// Station finder's answer to the most recent `Location`.
    #[serde(rename = "filteredlocations")]
    FilteredLocations { station: String },
    /// Global countdown run state.
    #[serde(rename = "timerUpdate")]
    TimerUpdate { timer: bool },
    /// One user is assigned one station.
    #[serde(rename = "chargeNow")]
    ChargeNow {
        station: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// Several users assigned at once; `stations[i]` goes to `user_ids[i]`.
    #[serde(rename = "chargeNowMultiple")]
    ChargeNowMultiple {
        stations: Vec<String>,
        #[serde(rename = "userIds")]
        user_ids: Vec<String>,
    },
}

impl DashboardEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Location { .. } => LOCATION,
            Self::FilteredLocations { .. } => FILTERED_LOCATIONS,
            Self::TimerUpdate { .. } => TIMER_UPDATE,
            Self::ChargeNow { .. } => CHARGE_NOW,
            Self::ChargeNowMultiple { .. } => CHARGE_NOW_MULTIPLE,
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let payload = match self {
            Self::Location { loc } => json!({ "loc": loc }),
            Self::FilteredLocations { station } => json!({ "station": station }),
            Self::TimerUpdate { timer } => json!({ "timer": timer }),
            Self::ChargeNow { station, user_id } => {
                json!({ "station": station, "userId": user_id })
            }
            Self::ChargeNowMultiple { stations, user_ids } => {
                json!({ "stations": stations, "userIds": user_ids })
            }
        };
        Envelope::new(self.name(), payload)
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self, EventError> {
        let known = [
            LOCATION,
            FILTERED_LOCATIONS,
            TIMER_UPDATE,
            CHARGE_NOW,
            CHARGE_NOW_MULTIPLE,
        ];
        if !known.contains(&envelope.event.as_str()) {
            return Err(EventError::UnknownEvent(envelope.event.clone()));
        }
        let tagged = json!({ "event": envelope.event, "payload": envelope.payload });
        serde_json::from_value(tagged).map_err(|source| EventError::Payload {
            event: envelope.event.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_now_uses_camel_case_user_id() {
        let env = DashboardEvent::ChargeNow {
            station: "S1".into(),
            user_id: "u7".into(),
        }
        .to_envelope();
        assert_eq!(env.event, "chargeNow");
        assert_eq!(env.payload, json!({ "station": "S1", "userId": "u7" }));
    }

    #[test]
    fn charge_now_multiple_payload_shape() {
        let env = DashboardEvent::ChargeNowMultiple {
            stations: vec!["S1".into(), "S2".into()],
            user_ids: vec!["a".into(), "b".into()],
        }
        .to_envelope();
        assert_eq!(
            env.payload,
            json!({ "stations": ["S1", "S2"], "userIds": ["a", "b"] })
        );
    }

    #[test]
    fn every_variant_reads_back_from_its_envelope() {
        let events = vec![
            DashboardEvent::Location { loc: "12.9,77.5".into() },
            DashboardEvent::FilteredLocations {
                station: "Koramangala".into(),
            },
            DashboardEvent::TimerUpdate { timer: true },
            DashboardEvent::ChargeNow {
                station: "S".into(),
                user_id: "u".into(),
            },
            DashboardEvent::ChargeNowMultiple {
                stations: vec!["S".into()],
                user_ids: vec!["u".into()],
            },
        ];
        for event in events {
            let back = DashboardEvent::from_envelope(&event.to_envelope()).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn parses_payload_written_by_another_client() {
        let env = Envelope::new("timerUpdate", json!({ "timer": false }));
        assert_eq!(
            DashboardEvent::from_envelope(&env).unwrap(),
            DashboardEvent::TimerUpdate { timer: false }
        );
    }

    #[test]
    fn unknown_event_is_rejected_by_name() {
        let env = Envelope::new("chat", json!({ "text": "hi" }));
        let err = DashboardEvent::from_envelope(&env).unwrap_err();
        assert!(matches!(err, EventError::UnknownEvent(name) if name == "chat"));
    }

    #[test]
    fn wrong_payload_shape_is_a_payload_error() {
        let env = Envelope::new("timerUpdate", json!({ "timer": "yes" }));
        let err = DashboardEvent::from_envelope(&env).unwrap_err();
        assert!(matches!(err, EventError::Payload { ref event, .. } if event == "timerUpdate"));
    }
}
