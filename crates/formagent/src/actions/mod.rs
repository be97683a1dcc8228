//! Action-command protocol embedded in assistant text
//!
//! The model is instructed to emit fixed-grammar tokens inside its
//! natural-language replies. This module extracts those tokens into
//! structured actions, preserving match order, and strips them from
//! the user-visible text.
//!
//! Token grammar:
//! - `UPDATE_FIELD:<fieldId>:<property>:<value>`
//! - `DELETE_FIELD:<fieldId>`
//! - `ADD_FIELD:<type>:<label>:<required>`
//! - `SAVE_FORM:confirm`
//! - `UPDATE_SETTING:<setting>:<value>`

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// A structured form mutation parsed from assistant text
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FormAction {
    /// Change one property of an existing field
    #[serde(rename_all = "camelCase")]
    UpdateField {
        field_id: String,
        property: String,
        value: String,
    },
    /// Remove a field
    #[serde(rename_all = "camelCase")]
    DeleteField { field_id: String },
    /// Append a new field
    #[serde(rename_all = "camelCase")]
    AddField {
        field_type: String,
        label: String,
        required: bool,
    },
    /// Persist the current draft
    SaveForm,
    /// Change a form-level setting
    #[serde(rename_all = "camelCase")]
    UpdateSetting { setting: String, value: String },
}

/// Result of scanning assistant text for action tokens
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedActions {
    /// The input text with all matched tokens removed
    pub text: String,
    /// Actions in the order their tokens appeared
    pub actions: Vec<FormAction>,
}

static ACTION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?:UPDATE_FIELD:(?P<uf_id>[\w-]+):(?P<uf_prop>[\w-]+):(?P<uf_val>\S+))
        |(?:DELETE_FIELD:(?P<df_id>[\w-]+))
        |(?:ADD_FIELD:(?P<af_type>[\w-]+):(?P<af_label>[^:\r\n]+):(?P<af_req>true|false))
        |(?:SAVE_FORM:confirm)
        |(?:UPDATE_SETTING:(?P<us_key>[\w-]+):(?P<us_val>\S+))
    ",
    )
    .expect("action token grammar must compile")
});

/// Extract action tokens from assistant text
///
/// Unrecognized or malformed tokens are left in the text untouched; the
/// parser is a best-effort text protocol, not a strict one.
pub fn parse(input: &str) -> ParsedActions {
    let mut actions = Vec::new();
    let mut residual = String::with_capacity(input.len());
    let mut cursor = 0;

    for caps in ACTION_TOKEN.captures_iter(input) {
        let full = caps.get(0).expect("match always has group 0");

        let action = if let Some(id) = caps.name("uf_id") {
            Some(FormAction::UpdateField {
                field_id: id.as_str().to_string(),
                property: caps["uf_prop"].to_string(),
                value: caps["uf_val"].to_string(),
            })
        } else if let Some(id) = caps.name("df_id") {
            Some(FormAction::DeleteField {
                field_id: id.as_str().to_string(),
            })
        } else if let Some(ty) = caps.name("af_type") {
            Some(FormAction::AddField {
                field_type: ty.as_str().to_string(),
                label: caps["af_label"].trim().to_string(),
                required: &caps["af_req"] == "true",
            })
        } else if caps.name("us_key").is_some() {
            Some(FormAction::UpdateSetting {
                setting: caps["us_key"].to_string(),
                value: caps["us_val"].to_string(),
            })
        } else if full.as_str().starts_with("SAVE_FORM") {
            Some(FormAction::SaveForm)
        } else {
            None
        };

        if let Some(action) = action {
            residual.push_str(&input[cursor..full.start()]);
            cursor = full.end();
            actions.push(action);
        }
    }

    residual.push_str(&input[cursor..]);

    ParsedActions {
        text: residual,
        actions,
    }
}
