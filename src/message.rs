//! Guest → host wire payload
//!
//! A message is composed and validated on the guest side, then travels as
//! a JSON object `{name, program, text, color, icon}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_NAME_LENGTH: usize = 30;
pub const MAX_PROGRAM_LENGTH: usize = 20;
pub const MAX_MESSAGE_LENGTH: usize = 100;

pub const DEFAULT_NAME: &str = "Anonymous";
pub const DEFAULT_PROGRAM: &str = "Guest";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Message text is empty")]
    EmptyText,

    #[error("{field} exceeds {max} characters ({len})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Invalid payload: {0}")]
    Malformed(String),
}

/// Bubble background colour, carried on the wire as its class tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BubbleColor {
    #[serde(rename = "bg-orange-500")]
    Orange,
    #[serde(rename = "bg-orange-600")]
    DeepOrange,
    #[serde(rename = "bg-amber-500")]
    Amber,
    #[serde(rename = "bg-orange-400")]
    Coral,
    #[serde(rename = "bg-orange-300")]
    Peach,
    #[serde(rename = "bg-orange-700")]
    BurntOrange,
    #[serde(rename = "bg-orange-200")]
    LightOrange,
}

impl BubbleColor {
    pub const ALL: [BubbleColor; 7] = [
        BubbleColor::Orange,
        BubbleColor::DeepOrange,
        BubbleColor::Amber,
        BubbleColor::Coral,
        BubbleColor::Peach,
        BubbleColor::BurntOrange,
        BubbleColor::LightOrange,
    ];

    pub fn class(&self) -> &'static str {
        match self {
            BubbleColor::Orange => "bg-orange-500",
            BubbleColor::DeepOrange => "bg-orange-600",
            BubbleColor::Amber => "bg-amber-500",
            BubbleColor::Coral => "bg-orange-400",
            BubbleColor::Peach => "bg-orange-300",
            BubbleColor::BurntOrange => "bg-orange-700",
            BubbleColor::LightOrange => "bg-orange-200",
        }
    }
}

impl Default for BubbleColor {
    fn default() -> Self {
        BubbleColor::Orange
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BubbleIcon {
    Heart,
    Baby,
    Home,
    Users,
    Shield,
    HandHeart,
    Flower2,
    Sparkles,
    Smile,
    HeartHandshake,
}

impl BubbleIcon {
    pub const ALL: [BubbleIcon; 10] = [
        BubbleIcon::Heart,
        BubbleIcon::Baby,
        BubbleIcon::Home,
        BubbleIcon::Users,
        BubbleIcon::Shield,
        BubbleIcon::HandHeart,
        BubbleIcon::Flower2,
        BubbleIcon::Sparkles,
        BubbleIcon::Smile,
        BubbleIcon::HeartHandshake,
    ];
}

impl Default for BubbleIcon {
    fn default() -> Self {
        BubbleIcon::Heart
    }
}

/// One guest message as sent over a data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub name: String,
    pub program: String,
    pub text: String,
    pub color: BubbleColor,
    pub icon: BubbleIcon,
}

impl MessagePayload {
    /// Build a payload from raw form input.
    ///
    /// All fields are trimmed; a blank name or program falls back to
    /// `"Anonymous"` / `"Guest"`. Lengths are counted in characters.
    pub fn compose(
        name: &str,
        program: &str,
        text: &str,
        color: BubbleColor,
        icon: BubbleIcon,
    ) -> Result<Self, PayloadError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PayloadError::EmptyText);
        }
        let name = or_default(name.trim(), DEFAULT_NAME);
        let program = or_default(program.trim(), DEFAULT_PROGRAM);

        check_length("name", name, MAX_NAME_LENGTH)?;
        check_length("program", program, MAX_PROGRAM_LENGTH)?;
        check_length("text", text, MAX_MESSAGE_LENGTH)?;

        Ok(Self {
            name: name.to_string(),
            program: program.to_string(),
            text: text.to_string(),
            color,
            icon,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
        serde_json::to_vec(self).map_err(|e| PayloadError::Malformed(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        serde_json::from_slice(data).map_err(|e| PayloadError::Malformed(e.to_string()))
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), PayloadError> {
    let len = value.chars().count();
    if len > max {
        return Err(PayloadError::TooLong { field, len, max });
    }
    Ok(())
}
