//! Editor window registry
//!
//! Editor sessions live on the host thread. Built-in plugins have no
//! native window; they get the fallback editor: the automatable parameter
//! list with labels and plain-language hints, rendered client-side as
//! sliders. `open_editor` on an already-open node reveals the existing
//! session instead of stacking a second one.

use serde::{Deserialize, Serialize};

use crate::api::{ParameterInfo, PluginDescriptor};

/// One slider in the fallback editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorSlider {
    #[serde(flatten)]
    pub parameter: ParameterInfo,
    /// Current normalized value
    pub value: f64,
}

/// What `vst.open_editor` hands the client to render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorView {
    pub node_id: String,
    pub title: String,
    /// `native` when the plugin draws its own window, `fallback` otherwise
    pub kind: String,
    pub sliders: Vec<EditorSlider>,
}

impl EditorView {
    /// Build the fallback view from a descriptor plus current values
    pub fn fallback(node_id: &str, descriptor: &PluginDescriptor, values: &[f64]) -> Self {
        let sliders = descriptor
            .parameters
            .iter()
            .enumerate()
            .map(|(index, parameter)| EditorSlider {
                parameter: parameter.clone(),
                value: values.get(index).copied().unwrap_or(parameter.default),
            })
            .collect();

        Self {
            node_id: node_id.to_string(),
            title: descriptor.name.clone(),
            kind: "fallback".to_string(),
            sliders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;

    #[test]
    fn fallback_view_mirrors_schema_and_values() {
        let descriptor = builtin::Reverb::descriptor();
        let view = EditorView::fallback("node_1", &descriptor, &[0.9, 0.1, 0.5]);

        assert_eq!(view.kind, "fallback");
        assert_eq!(view.sliders.len(), descriptor.parameters.len());
        assert_eq!(view.sliders[0].value, 0.9);
        assert_eq!(view.sliders[0].parameter.id, "room_size");
        assert!(!view.sliders[0].parameter.hint.is_empty());
    }

    #[test]
    fn missing_values_fall_back_to_defaults() {
        let descriptor = builtin::Chorus::descriptor();
        let view = EditorView::fallback("node_2", &descriptor, &[]);
        for slider in &view.sliders {
            assert_eq!(slider.value, slider.parameter.default);
        }
    }
}
