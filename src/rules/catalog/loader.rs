use std::fs;
use std::path::Path;

use tracing::{debug, trace};

use crate::error::CatalogError;

use super::schema::CatalogFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Json,
    Yaml,
}

impl CatalogFormat {
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");
        match extension {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(CatalogError::unsupported_format(path, extension)),
        }
    }
}

pub fn parse_catalog(content: &str, format: CatalogFormat, origin: &Path) -> Result<CatalogFile, CatalogError> {
    let file: CatalogFile = match format {
        CatalogFormat::Json => serde_json::from_str(content)
            .map_err(|e| CatalogError::malformed(origin, e.to_string()))?,
        CatalogFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| CatalogError::malformed(origin, e.to_string()))?,
    };
    trace!(path = %origin.display(), rules = file.rules.len(), "parsed rule definitions");
    Ok(file)
}

pub fn read_catalog(path: &Path) -> Result<CatalogFile, CatalogError> {
    debug!(path = %path.display(), "loading rules file");
    let format = CatalogFormat::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|e| CatalogError::unreadable(path, e))?;
    parse_catalog(&content, format, path)
}
