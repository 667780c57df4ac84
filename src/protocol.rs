//! Real-time channel wire format.
//!
//! Every frame is a JSON text message shaped `{"event": <name>, "data": {...}}`.

use serde::{Deserialize, Serialize};

/// Message shown to the client when add-plant is refused or fails.
pub const ADD_PLANT_FAILED: &str = "Failed to add plant due to server error";

/// One synthetic sensor sample for a plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: f64,
    pub water_level: u8,
    pub number_of_insects: u8,
}

/// Server -> client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    NewPlant {
        plant_id: i64,
        plant_name: String,
        plant_type: String,
    },
    UpdatePlant {
        plant_id: i64,
        data: Reading,
    },
    Error {
        error: String,
    },
}

impl PushEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing these plain structs cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Client -> server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    AddPlant {
        plant_name: String,
        plant_type: String,
    },
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
