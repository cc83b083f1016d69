//! Presentation request model.
//!
//! A request is created once per caller invocation and is immutable: the
//! pipeline never mutates it in place, each stage derives new state carrying
//! the request along.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A closed, serializable event parameter value.
///
/// Replaces the dictionaries-of-`Any` the dashboard payloads use so that
/// parameter handling is statically checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<EventValue>),
    Object(BTreeMap<String, EventValue>),
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<bool> for EventValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for EventValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// The event that caused a trigger to be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, EventValue>,
    pub created_at: DateTime<Utc>,
}

impl EventData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<EventValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Opaque handle to something a paywall can be presented on.
///
/// The view hierarchy itself is the host's concern; the pipeline only needs
/// identity so the debugger-exclusivity and fallback-overlay checks work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenterHandle {
    /// A presenter explicitly supplied by the caller.
    Explicit(String),
    /// The lazily created overlay window.
    Overlay,
    /// The debug-preview presenter.
    Debugger,
}

/// How paywall content should be fetched for this request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Use cached content when available, fetch otherwise.
    #[default]
    CacheOrFetch,
    /// Always fetch fresh content.
    FreshFetch,
}

/// Per-request flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationFlags {
    /// Set when the request originates from the debug-preview flow. While a
    /// debug session is active, only such requests may proceed.
    pub from_debugger: bool,
}

/// Caller-supplied overrides applied during content resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaywallOverrides {
    /// Present this paywall id instead of the one the variant selected.
    pub paywall_id: Option<String>,
}

/// A single paywall presentation attempt. Immutable; flows through the whole
/// pipeline by move.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationRequest {
    pub trigger_name: String,
    pub event: Option<EventData>,
    pub flags: PresentationFlags,
    pub cache_policy: CachePolicy,
    pub overrides: PaywallOverrides,
    /// Presenter supplied by the caller, if any. Absent means the pipeline
    /// falls back to the overlay window.
    pub presenter: Option<PresenterHandle>,
}

impl PresentationRequest {
    pub fn new(trigger_name: impl Into<String>) -> Self {
        let trigger_name = trigger_name.into();
        Self {
            event: Some(EventData::new(trigger_name.clone())),
            trigger_name,
            flags: PresentationFlags::default(),
            cache_policy: CachePolicy::default(),
            overrides: PaywallOverrides::default(),
            presenter: None,
        }
    }

    pub fn with_event(mut self, event: EventData) -> Self {
        self.event = Some(event);
        self
    }

    pub fn with_presenter(mut self, presenter: PresenterHandle) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn with_flags(mut self, flags: PresentationFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_overrides(mut self, overrides: PaywallOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_defaults() {
        let request = PresentationRequest::new("campaign_trigger");
        assert_eq!(request.trigger_name, "campaign_trigger");
        assert_eq!(request.cache_policy, CachePolicy::CacheOrFetch);
        assert!(!request.flags.from_debugger);
        assert!(request.presenter.is_none());
        assert_eq!(request.event.unwrap().name, "campaign_trigger");
    }

    #[test]
    fn test_event_value_round_trip() {
        let event = EventData::new("purchase_tapped")
            .with_param("screen", "settings")
            .with_param("count", 3i64)
            .with_param("trial", true);

        let json = serde_json::to_string(&event).unwrap();
        let back: EventData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.params["screen"], EventValue::String("settings".into()));
        assert_eq!(back.params["count"], EventValue::Int(3));
        assert_eq!(back.params["trial"], EventValue::Bool(true));
    }
}
