//! Form draft model
//!
//! FormAgent mutates drafts exclusively through the action-command
//! protocol; this module holds the draft document shape and the logic
//! for applying parsed actions to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::actions::FormAction;

/// A single field on a form draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// Stable identifier used by action commands
    pub id: String,
    /// Field type ("text", "email", "number", "select", ...)
    #[serde(rename = "type")]
    pub field_type: String,
    /// Label shown to the person filling the form
    pub label: String,
    /// Whether the field must be filled
    pub required: bool,
    /// Options for choice-type fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Optional validation rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
}

/// Draft metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the assistant emitted SAVE_FORM:confirm
    pub save_requested: bool,
}

/// A data-collection form under construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDraft {
    pub title: String,
    pub description: String,
    pub fields: Vec<FormField>,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    pub metadata: FormMetadata,
}

impl FormDraft {
    /// Create an empty draft
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            title: title.into(),
            description: description.into(),
            fields: Vec::new(),
            settings: BTreeMap::new(),
            metadata: FormMetadata {
                created_at: now,
                updated_at: now,
                save_requested: false,
            },
        }
    }

    /// Apply a single parsed action to the draft
    ///
    /// Returns false when the action referenced a field that does not
    /// exist or a property the draft does not understand.
    pub fn apply(&mut self, action: &FormAction) -> bool {
        let applied = match action {
            FormAction::AddField {
                field_type,
                label,
                required,
            } => {
                let id = self.unique_field_id(label);
                self.fields.push(FormField {
                    id,
                    field_type: field_type.clone(),
                    label: label.clone(),
                    required: *required,
                    options: Vec::new(),
                    validation: None,
                });
                true
            }
            FormAction::UpdateField {
                field_id,
                property,
                value,
            } => match self.fields.iter_mut().find(|f| &f.id == field_id) {
                Some(field) => match property.as_str() {
                    "label" => {
                        field.label = value.clone();
                        true
                    }
                    "type" => {
                        field.field_type = value.clone();
                        true
                    }
                    "required" => {
                        field.required = value == "true";
                        true
                    }
                    "validation" => {
                        field.validation = Some(value.clone());
                        true
                    }
                    _ => false,
                },
                None => false,
            },
            FormAction::DeleteField { field_id } => {
                let before = self.fields.len();
                self.fields.retain(|f| &f.id != field_id);
                self.fields.len() < before
            }
            FormAction::SaveForm => {
                self.metadata.save_requested = true;
                true
            }
            FormAction::UpdateSetting { setting, value } => {
                self.settings.insert(setting.clone(), value.clone());
                true
            }
        };

        if applied {
            self.metadata.updated_at = Utc::now();
        }
        applied
    }

    /// Apply a batch of actions in order, returning how many applied cleanly
    pub fn apply_all(&mut self, actions: &[FormAction]) -> usize {
        actions.iter().filter(|a| self.apply(a)).count()
    }

    /// Derive a field id from the label, disambiguating duplicates
    fn unique_field_id(&self, label: &str) -> String {
        let base: String = label
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let base = base.trim_matches('_').to_string();
        let base = if base.is_empty() { "field".to_string() } else { base };

        if !self.fields.iter().any(|f| f.id == base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if !self.fields.iter().any(|f| f.id == candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}
