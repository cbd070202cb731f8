use serde::{Deserialize, Serialize};

use super::package::Package;
use crate::domain::PackageError;

/// Logical lane of a frame on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Request,
    Response,
    Event,
}

/// Unit carried by a `Link`: a channel tag plus the packed package as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub channel: Channel,
    pub body: String,
}

impl Frame {
    pub fn new(channel: Channel, package: &Package) -> Self {
        Self {
            channel,
            body: package.pack().to_string(),
        }
    }

    pub fn parse_body(&self) -> Result<serde_json::Value, PackageError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn to_json(&self) -> Result<String, PackageError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, PackageError> {
        Ok(serde_json::from_str(text)?)
    }
}
