//! Notification payload model and JSON serialization.
//!
//! A payload is the `aps` envelope plus arbitrary custom fields merged at the
//! top level of the JSON document. Optional fields are omitted when unset,
//! never emitted as `null`. The badge carries a tri-state (`Unset`, `Clear`,
//! `Set`) because "omit the key" and "emit 0" mean different things to the
//! device.

use serde_json::{json, Map, Value};

use crate::error::{PushError, Result, MAX_PAYLOAD_BYTES};

/// The `aps.alert` value: either a bare body string or the structured form
/// with localization fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Body(String),
    Structured(AlertBody),
}

impl Alert {
    fn to_value(&self) -> Value {
        match self {
            Alert::Body(body) => Value::String(body.clone()),
            Alert::Structured(alert) => alert.to_value(),
        }
    }
}

impl From<&str> for Alert {
    fn from(body: &str) -> Self {
        Alert::Body(body.to_string())
    }
}

impl From<String> for Alert {
    fn from(body: String) -> Self {
        Alert::Body(body)
    }
}

/// Structured alert with localization support. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertBody {
    pub body: Option<String>,
    pub action_loc_key: Option<String>,
    pub loc_key: Option<String>,
    pub loc_args: Vec<String>,
    pub launch_image: Option<String>,
}

impl AlertBody {
    fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(ref body) = self.body {
            map.insert("body".to_string(), json!(body));
        }
        if let Some(ref key) = self.action_loc_key {
            map.insert("action-loc-key".to_string(), json!(key));
        }
        if let Some(ref key) = self.loc_key {
            map.insert("loc-key".to_string(), json!(key));
        }
        if !self.loc_args.is_empty() {
            map.insert("loc-args".to_string(), json!(self.loc_args));
        }
        if let Some(ref image) = self.launch_image {
            map.insert("launch-image".to_string(), json!(image));
        }
        Value::Object(map)
    }
}

/// Badge tri-state. `Unset` omits the key, `Clear` emits `0` (remove the
/// badge from the app icon), `Set(n)` emits `n`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Badge {
    #[default]
    Unset,
    Clear,
    Set(u32),
}

/// The APS envelope plus custom top-level fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub alert: Option<Alert>,
    pub badge: Badge,
    pub sound: Option<String>,
    /// Emitted as the integer `1` when set.
    pub content_available: bool,
    pub category: Option<String>,
    custom: Map<String, Value>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a plain alert-body payload.
    pub fn alert(body: impl Into<Alert>) -> Self {
        Self {
            alert: Some(body.into()),
            ..Self::default()
        }
    }

    /// Add a custom field merged at the top level of the JSON document.
    /// The `aps` key is reserved for the envelope.
    pub fn add_custom(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if key == "aps" {
            return Err(PushError::ReservedPayloadKey(key));
        }
        self.custom.insert(key, value);
        Ok(())
    }

    /// Custom fields currently set.
    pub fn custom_fields(&self) -> &Map<String, Value> {
        &self.custom
    }

    /// Build the JSON document: an `aps` object containing only set fields,
    /// custom keys merged alongside it.
    pub fn to_value(&self) -> Value {
        let mut aps = Map::new();
        if let Some(ref alert) = self.alert {
            aps.insert("alert".to_string(), alert.to_value());
        }
        match self.badge {
            Badge::Unset => {}
            Badge::Clear => {
                aps.insert("badge".to_string(), json!(0));
            }
            Badge::Set(n) => {
                aps.insert("badge".to_string(), json!(n));
            }
        }
        if let Some(ref sound) = self.sound {
            aps.insert("sound".to_string(), json!(sound));
        }
        if self.content_available {
            aps.insert("content-available".to_string(), json!(1));
        }
        if let Some(ref category) = self.category {
            aps.insert("category".to_string(), json!(category));
        }

        let mut root = Map::new();
        root.insert("aps".to_string(), Value::Object(aps));
        for (key, value) in &self.custom {
            root.insert(key.clone(), value.clone());
        }
        Value::Object(root)
    }

    /// Serialize to compact JSON, enforcing the gateway's size limit.
    /// Exceeding it is a permanent failure of the notification, not a
    /// transport error.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(&self.to_value())?;
        if bytes.len() > MAX_PAYLOAD_BYTES {
            return Err(PushError::PayloadTooLarge(bytes.len()));
        }
        Ok(bytes)
    }
}
