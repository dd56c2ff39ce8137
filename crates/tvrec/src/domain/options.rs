use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_PROFILE: &str = "Default";
pub const LIVE_TV_PROFILE: &str = "Live TV";

/// Named encoder settings for a card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingProfile {
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, i64>,
}

impl RecordingProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: i64) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    pub fn option(&self, name: &str) -> Option<i64> {
        self.options.get(name).copied()
    }

    /// Transcoding stays in the job mask only when the profile enables it.
    pub fn allows_autotranscode(&self) -> bool {
        self.option("autotranscode").is_some_and(|value| value != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Int(i64),
    Text(String),
}

/// Settings handed to a recorder backend when it is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderOptions {
    values: BTreeMap<String, OptionValue>,
    /// Sink write buffer the backend needs, in bytes.
    pub write_buffer_size: Option<usize>,
    /// Picture-in-picture viewer.
    pub pip: bool,
}

impl RecorderOptions {
    pub fn from_profile(profile: &RecordingProfile) -> Self {
        let mut options = Self::default();
        for (name, value) in &profile.options {
            options.set_int(name, *value);
        }
        options
    }

    pub fn set_int(&mut self, name: &str, value: i64) {
        self.values.insert(name.to_string(), OptionValue::Int(value));
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.values
            .insert(name.to_string(), OptionValue::Text(value.into()));
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.set_int(name, i64::from(value));
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(OptionValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}
