//! Tile provider driven by a URL template such as
//! `https://tile.openstreetmap.org/{z}/{x}/{y}.png`.

use deepzoom::provider::{TileLayer, TileProvider};
use deepzoom::TileAddress;

use crate::error::CliError;

const PLACEHOLDERS: [&str; 3] = ["{z}", "{x}", "{y}"];

/// Expands `{z}`, `{x}` and `{y}` for each address.
#[derive(Debug, Clone)]
pub struct TemplateProvider {
    id: String,
    template: String,
}

impl TemplateProvider {
    pub fn new(id: impl Into<String>, template: impl Into<String>) -> Result<Self, CliError> {
        let template = template.into();
        let missing: Vec<&str> = PLACEHOLDERS
            .iter()
            .copied()
            .filter(|p| !template.contains(p))
            .collect();
        if !missing.is_empty() {
            return Err(CliError::Config(format!(
                "URL template '{}' is missing {}",
                template,
                missing.join(", ")
            )));
        }
        Ok(Self {
            id: id.into(),
            template,
        })
    }

    pub fn url(&self, address: TileAddress) -> String {
        self.template
            .replace("{z}", &address.level.to_string())
            .replace("{x}", &address.x.to_string())
            .replace("{y}", &address.y.to_string())
    }
}

impl TileProvider for TemplateProvider {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn tile_layer(&mut self, address: TileAddress) -> TileLayer {
        TileLayer::Uri(self.url(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expands_placeholders() {
        let provider =
            TemplateProvider::new("osm", "https://tiles.example/{z}/{x}/{y}.png").unwrap();
        assert_eq!(
            provider.url(TileAddress::new(5, 3, 7)),
            "https://tiles.example/5/3/7.png"
        );
    }

    #[test]
    fn test_rejects_incomplete_template() {
        let err = TemplateProvider::new("osm", "https://tiles.example/{z}/{x}.png").unwrap_err();
        assert!(err.to_string().contains("{y}"));
    }

    #[test]
    fn test_tile_layer_is_uri() {
        let mut provider = TemplateProvider::new("t", "{z}-{x}-{y}").unwrap();
        match provider.tile_layer(TileAddress::new(1, 0, 1)) {
            TileLayer::Uri(uri) => assert_eq!(uri, "1-0-1"),
            other => panic!("unexpected layer {:?}", other),
        }
        assert_eq!(provider.cache_name(TileAddress::new(1, 0, 1)), "t.1x0x1");
    }

    #[test]
    fn test_default_cache_uri_check() {
        let mut provider = TemplateProvider::new("t", "{z}/{x}/{y}").unwrap();
        let address = TileAddress::new(2, 1, 1);
        assert!(provider.is_valid_cache_uri(address, "2/1/1"));
        assert!(!provider.is_valid_cache_uri(address, "2/1/0"));
    }
}
