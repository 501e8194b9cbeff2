use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Text,
    Tables,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenditionType {
    Tables,
    Figures,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableFormat {
    #[default]
    Csv,
    Xlsx,
}

/// What the service is asked to extract for each document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionProfile {
    pub elements: Vec<ElementType>,
    pub renditions: Vec<RenditionType>,
    pub table_format: TableFormat,
    /// Per-character bounding boxes
    pub char_info: bool,
    /// Font and styling attributes
    pub styling: bool,
}

impl Default for ExtractionProfile {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExtractionProfile {
    /// Text and tables, CSV tables, figure and table renditions.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            elements: vec![ElementType::Text, ElementType::Tables],
            renditions: vec![RenditionType::Figures, RenditionType::Tables],
            table_format: TableFormat::Csv,
            char_info: false,
            styling: false,
        }
    }

    /// `standard` plus character bounds and styling information.
    #[must_use]
    pub fn detailed() -> Self {
        Self {
            char_info: true,
            styling: true,
            ..Self::standard()
        }
    }

    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::standard()),
            "detailed" => Some(Self::detailed()),
            _ => None,
        }
    }

    /// Job options body for an extract operation on `asset_id`.
    #[must_use]
    pub fn job_options(&self, asset_id: &str) -> serde_json::Value {
        let mut options = json!({
            "assetID": asset_id,
            "elementsToExtract": self.elements,
            "tableOutputFormat": self.table_format,
            "getCharBounds": self.char_info,
            "includeStyling": self.styling,
        });
        if !self.renditions.is_empty() {
            options["elementsToExtractRenditions"] = json!(self.renditions);
        }
        options
    }
}
