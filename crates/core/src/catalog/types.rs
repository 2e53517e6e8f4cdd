use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Imagery search filters passed through to the catalog service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    /// Additional catalog-specific filters, forwarded verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl SearchCriteria {
    /// Flatten into query parameters, in a stable order.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let named = [
            ("target", &self.target),
            ("mission", &self.mission),
            ("instrument", &self.instrument),
            ("product_type", &self.product_type),
        ];
        for (key, value) in named {
            if let Some(value) = value {
                pairs.push((key.to_string(), value.clone()));
            }
        }
        if let Some(bounds) = &self.bounds {
            pairs.push(("min_lat".to_string(), bounds.min_lat.to_string()));
            pairs.push(("max_lat".to_string(), bounds.max_lat.to_string()));
            pairs.push(("west_lon".to_string(), bounds.west_lon.to_string()));
            pairs.push(("east_lon".to_string(), bounds.east_lon.to_string()));
        }
        for (key, value) in &self.extra {
            pairs.push((key.clone(), value.clone()));
        }
        pairs
    }
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub west_lon: f64,
    pub east_lon: f64,
}

/// Errors from the catalog service.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Catalog request timed out")]
    Timeout,

    #[error("Catalog connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Catalog API error: {0}")]
    ApiError(String),
}
