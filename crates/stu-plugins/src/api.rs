//! Plugin descriptors and the normalized parameter model
//!
//! Parameters are stored normalized to [0, 1] everywhere outside the DSP;
//! the mapping to the native range belongs to the plugin. The schema is
//! recorded at instantiation so clients can render controls without
//! re-interrogating the plugin.

use serde::{Deserialize, Serialize};

/// Instrument or effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Instrument,
    Effect,
}

/// One automatable parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub id: String,
    pub name: String,
    /// Native range, informational for display
    pub min: f64,
    pub max: f64,
    /// Normalized default in [0, 1]
    pub default: f64,
    /// Plain-language hint for the fallback editor
    pub hint: String,
}

impl ParameterInfo {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        min: f64,
        max: f64,
        default: f64,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            min,
            max,
            default: default.clamp(0.0, 1.0),
            hint: hint.into(),
        }
    }

    /// Linear denormalization into the native range
    pub fn denormalize(&self, normalized: f64) -> f64 {
        self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min)
    }
}

/// What a scan reports per plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub uid: String,
    pub name: String,
    pub kind: PluginKind,
    /// Built-in plugins ship inside the engine
    pub is_native: bool,
    pub parameters: Vec<ParameterInfo>,
}

impl PluginDescriptor {
    pub fn parameter(&self, id: &str) -> Option<(usize, &ParameterInfo)> {
        self.parameters
            .iter()
            .enumerate()
            .find(|(_, p)| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denormalize_maps_linearly() {
        let param = ParameterInfo::new("cutoff", "Cutoff", 20.0, 20_020.0, 0.5, "brightness");
        assert_eq!(param.denormalize(0.0), 20.0);
        assert_eq!(param.denormalize(0.5), 10_020.0);
        assert_eq!(param.denormalize(1.5), 20_020.0); // clamped
    }

    #[test]
    fn parameter_lookup_by_id() {
        let descriptor = PluginDescriptor {
            uid: "internal:test".to_string(),
            name: "Test".to_string(),
            kind: PluginKind::Effect,
            is_native: true,
            parameters: vec![
                ParameterInfo::new("a", "A", 0.0, 1.0, 0.0, ""),
                ParameterInfo::new("b", "B", 0.0, 1.0, 0.0, ""),
            ],
        };
        assert_eq!(descriptor.parameter("b").unwrap().0, 1);
        assert!(descriptor.parameter("missing").is_none());
    }
}
