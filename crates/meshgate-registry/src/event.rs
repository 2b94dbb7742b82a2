//! Registration events and the timestamp-replay merge
//!
//! Every source contributes immutable [`Registration`] events. The merged
//! view is rebuilt from scratch by sorting all of them by timestamp and
//! replaying them in order, so the result does not depend on the order in
//! which sources were read.
//!
//! Replaying one event:
//!
//! 1. drop whatever device currently holds the event's call sign
//! 2. drop the event's device
//! 3. if both identities are present, bind them
//!
//! An event with one identity missing is a tombstone: it runs steps 1 and 2
//! only. The view stays injective throughout.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Where a registration event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Registered directly with this gateway over the mesh
    Local,
    /// Learned from another gateway's registration beacon
    Beaconed,
    /// Community seed list
    Precompiled,
    /// Operator overrides, always newest
    Override,
}

/// One registration fact
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// Mesh device id (`!xxxxxxxx`)
    pub device_id: Option<String>,
    /// Call sign with SSID
    pub call_sign: Option<String>,
    /// Two- or three-character icon code
    pub icon: Option<String>,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Origin of the event
    pub source: Source,
}

impl Registration {
    /// Create a registration event
    pub fn new(
        device_id: Option<String>,
        call_sign: Option<String>,
        icon: Option<String>,
        timestamp: f64,
        source: Source,
    ) -> Self {
        Self {
            device_id,
            call_sign,
            icon,
            timestamp,
            source,
        }
    }

    /// True when the event only deletes
    pub fn is_tombstone(&self) -> bool {
        self.device_id.is_none() || self.call_sign.is_none()
    }
}

/// Merged binding for one device
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Bound call sign
    pub call_sign: String,
    /// Icon code, if the operator chose one
    pub icon: Option<String>,
    /// Timestamp of the event that created the binding
    pub timestamp: f64,
    /// Source of that event
    pub source: Source,
}

/// Injective device id → call sign mapping
#[derive(Debug, Clone, Default)]
pub struct MergedView {
    by_device: BTreeMap<String, Entry>,
    // upper-cased call sign -> device id
    by_call_sign: HashMap<String, String>,
}

fn call_sign_key(call_sign: &str) -> String {
    call_sign.trim().to_uppercase()
}

impl MergedView {
    /// Sort events by timestamp and replay them into a fresh view
    ///
    /// Events with equal timestamps keep their relative input order.
    pub fn replay(events: impl IntoIterator<Item = Registration>) -> Self {
        let mut events: Vec<Registration> = events.into_iter().collect();
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut view = Self::default();
        for event in &events {
            view.apply(event);
        }
        view
    }

    /// Replay a single event on top of the current view
    pub fn apply(&mut self, event: &Registration) {
        if let Some(call_sign) = &event.call_sign {
            if let Some(device) = self.by_call_sign.remove(&call_sign_key(call_sign)) {
                self.by_device.remove(&device);
            }
        }

        if let Some(device) = &event.device_id {
            if let Some(old) = self.by_device.remove(device) {
                self.by_call_sign.remove(&call_sign_key(&old.call_sign));
            }
        }

        let (Some(device), Some(call_sign)) = (&event.device_id, &event.call_sign) else {
            return;
        };

        self.by_call_sign
            .insert(call_sign_key(call_sign), device.clone());
        self.by_device.insert(
            device.clone(),
            Entry {
                call_sign: call_sign.clone(),
                icon: event.icon.clone(),
                timestamp: event.timestamp,
                source: event.source,
            },
        );
    }

    /// Binding for a device
    pub fn get(&self, device_id: &str) -> Option<&Entry> {
        self.by_device.get(device_id)
    }

    /// Device bound to a call sign (case-insensitive)
    pub fn device_for(&self, call_sign: &str) -> Option<&str> {
        self.by_call_sign
            .get(&call_sign_key(call_sign))
            .map(String::as_str)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.by_device.len()
    }

    /// True when nothing is bound
    pub fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }

    /// Bindings in device id order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.by_device.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Current time as fractional seconds since the Unix epoch
pub fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
