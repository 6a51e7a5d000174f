use super::ADDON_ID;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Addon manifest served at `/manifest.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonManifest {
    /// Reverse-domain addon id
    pub id: String,
    /// Display name
    pub name: String,
    /// Addon version (the crate version)
    pub version: String,
    /// One-line description
    pub description: String,
    /// Resources the addon serves
    pub resources: Vec<String>,
    /// Content types the addon serves
    pub types: Vec<String>,
    /// Id prefixes the addon understands
    pub id_prefixes: Vec<String>,
    /// Catalogs offered (none)
    #[schema(value_type = Vec<Object>)]
    pub catalogs: Vec<serde_json::Value>,
    /// Installation hints
    pub behavior_hints: ManifestHints,
}

/// Installation hints of the addon manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestHints {
    /// Whether the addon has a configuration page
    pub configurable: bool,
    /// Whether configuration is needed before use
    pub configuration_required: bool,
}

impl Default for AddonManifest {
    fn default() -> Self {
        Self {
            id: ADDON_ID.to_string(),
            name: "NZBio".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Stream movies and series from Usenet via direct indexer search"
                .to_string(),
            resources: vec!["stream".to_string()],
            types: vec!["movie".to_string(), "series".to_string()],
            id_prefixes: vec!["tt".to_string()],
            catalogs: Vec::new(),
            behavior_hints: ManifestHints {
                configurable: false,
                configuration_required: false,
            },
        }
    }
}
