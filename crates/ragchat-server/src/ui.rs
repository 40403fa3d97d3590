//! Chat front-end metadata: profiles, conversation starters and the
//! settings panel definition.

use ragchat_core::config::UiConfig;
use ragchat_core::SessionSettings;
use serde::Serialize;

/// A control in the chat settings panel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SettingsWidget {
    Select {
        id: String,
        label: String,
        values: Vec<String>,
        initial_index: usize,
    },
    Switch {
        id: String,
        label: String,
        initial: bool,
    },
    Slider {
        id: String,
        label: String,
        initial: f32,
        min: f32,
        max: f32,
        step: f32,
    },
}

/// Model picker, streaming toggle and temperature slider, initialised from
/// the session defaults.
pub fn settings_widgets(ui: &UiConfig, defaults: &SessionSettings) -> Vec<SettingsWidget> {
    let mut models = ui.models.clone();
    let initial_index = match models.iter().position(|m| *m == defaults.model) {
        Some(index) => index,
        None => {
            models.insert(0, defaults.model.clone());
            0
        }
    };

    vec![
        SettingsWidget::Select {
            id: "Model".to_string(),
            label: "OpenAI - Model".to_string(),
            values: models,
            initial_index,
        },
        SettingsWidget::Switch {
            id: "Streaming".to_string(),
            label: "OpenAI - Stream Tokens".to_string(),
            initial: defaults.streaming,
        },
        SettingsWidget::Slider {
            id: "Temperature".to_string(),
            label: "OpenAI - Temperature".to_string(),
            initial: defaults.temperature,
            min: 0.0,
            max: 2.0,
            step: 0.1,
        },
    ]
}
