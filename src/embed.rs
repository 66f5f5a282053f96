//! Presentation payload
//!
//! Results leave the core as an [`Embed`]: a headline, ordered fields with an
//! inline hint, optional image/thumbnail references and a footer. The chat
//! renderer turns this into platform-native rich messages.

use serde::Serialize;

/// Accent colors
pub mod colors {
    pub const INFO: u32 = 0x3498db;
    pub const SUCCESS: u32 = 0x2ecc71;
    pub const WARNING: u32 = 0xf1c40f;
    pub const DANGER: u32 = 0xe74c3c;
    pub const BATTLE: u32 = 0x9b59b6;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            color: colors::INFO,
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    /// Set the thumbnail; empty references are ignored
    pub fn thumbnail(mut self, url: Option<&str>) -> Self {
        self.thumbnail = url.filter(|u| !u.is_empty()).map(str::to_string);
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Look up a field value by name
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Render a `current/max` pool
pub fn pool(current: i64, max: i64) -> String {
    format!("{}/{}", current, max)
}
