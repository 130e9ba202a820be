//! Product and mapping catalog interfaces
//!
//! The interpreters consult a catalog to turn raw tag identifiers into
//! product names, colors and SKUs. The backing store is external; this
//! module defines the query surface plus an in-memory implementation that
//! can be loaded from JSON and swapped at runtime.

use crate::color;
use crate::error::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Exact mapping for a manufacturer material code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialMapping {
    /// `materialId:variantId`
    pub code: String,
    pub material: String,
    pub color: String,
    pub hex: String,
    pub sku: Option<String>,
}

/// A catalog product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub vendor: String,
    pub sku: String,
    pub name: String,
    pub material_type: String,
    pub color_name: String,
    pub color_hex: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Query interface over mapping and product data
pub trait MappingCatalog: Send + Sync {
    /// Exact lookup by manufacturer material and variant ids
    fn lookup_by_code(&self, material_id: &str, variant_id: &str) -> Option<MaterialMapping>;

    /// Products for a vendor, optionally narrowed by color and material type
    fn find_products(
        &self,
        vendor: &str,
        hex: Option<&str>,
        material_type: Option<&str>,
    ) -> Vec<ProductEntry>;
}

/// Supplies the current catalog snapshot
///
/// `InterpreterFactory::refresh_mappings` calls `current` to pick up
/// catalog updates without rescanning tags.
pub trait CatalogSource: Send + Sync {
    fn current(&self) -> Arc<dyn MappingCatalog>;
}

/// In-memory catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub mappings: Vec<MaterialMapping>,
    #[serde(default)]
    pub products: Vec<ProductEntry>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json(&source)
    }

    pub fn with_mapping(mut self, mapping: MaterialMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    pub fn with_product(mut self, product: ProductEntry) -> Self {
        self.products.push(product);
        self
    }
}

impl MappingCatalog for StaticCatalog {
    fn lookup_by_code(&self, material_id: &str, variant_id: &str) -> Option<MaterialMapping> {
        let code = format!("{}:{}", material_id, variant_id);
        self.mappings.iter().find(|m| m.code == code).cloned()
    }

    fn find_products(
        &self,
        vendor: &str,
        hex: Option<&str>,
        material_type: Option<&str>,
    ) -> Vec<ProductEntry> {
        let wanted_hex = hex.and_then(color::normalize_hex);

        self.products
            .iter()
            .filter(|p| p.vendor.eq_ignore_ascii_case(vendor))
            .filter(|p| match &wanted_hex {
                Some(h) => color::normalize_hex(&p.color_hex).as_deref() == Some(h.as_str()),
                None => true,
            })
            .filter(|p| match material_type {
                Some(m) => p.material_type.eq_ignore_ascii_case(m),
                None => true,
            })
            .cloned()
            .collect()
    }
}

impl CatalogSource for StaticCatalog {
    fn current(&self) -> Arc<dyn MappingCatalog> {
        Arc::new(self.clone())
    }
}

/// Catalog handle that can be replaced while readers hold older snapshots
#[derive(Default)]
pub struct SharedCatalog {
    inner: RwLock<Arc<StaticCatalog>>,
}

impl SharedCatalog {
    pub fn new(catalog: StaticCatalog) -> Self {
        SharedCatalog {
            inner: RwLock::new(Arc::new(catalog)),
        }
    }

    /// Swap in a new catalog; takes effect on the next refresh
    pub fn replace(&self, catalog: StaticCatalog) {
        *self.inner.write() = Arc::new(catalog);
    }
}

impl CatalogSource for SharedCatalog {
    fn current(&self) -> Arc<dyn MappingCatalog> {
        self.inner.read().clone()
    }
}

/// Catalog with no entries
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

impl MappingCatalog for EmptyCatalog {
    fn lookup_by_code(&self, _material_id: &str, _variant_id: &str) -> Option<MaterialMapping> {
        None
    }

    fn find_products(
        &self,
        _vendor: &str,
        _hex: Option<&str>,
        _material_type: Option<&str>,
    ) -> Vec<ProductEntry> {
        Vec::new()
    }
}

impl CatalogSource for EmptyCatalog {
    fn current(&self) -> Arc<dyn MappingCatalog> {
        Arc::new(EmptyCatalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(vendor: &str, material: &str, name: &str, hex: &str) -> ProductEntry {
        ProductEntry {
            vendor: vendor.to_string(),
            sku: format!("{}-{}", material, name).to_uppercase(),
            name: name.to_string(),
            material_type: material.to_string(),
            color_name: name.to_string(),
            color_hex: hex.to_string(),
            url: None,
        }
    }

    #[test]
    fn test_lookup_by_code() {
        let catalog = StaticCatalog::new().with_mapping(MaterialMapping {
            code: "GFA00:A00-K0".to_string(),
            material: "PLA Basic".to_string(),
            color: "Black".to_string(),
            hex: "#000000".to_string(),
            sku: Some("10101".to_string()),
        });

        assert!(catalog.lookup_by_code("GFA00", "A00-K0").is_some());
        assert!(catalog.lookup_by_code("GFA00", "A00-W1").is_none());
    }

    #[test]
    fn test_find_products_filters() {
        let catalog = StaticCatalog::new()
            .with_product(product("Bambu Lab", "PLA", "Jade White", "#ffffff"))
            .with_product(product("Bambu Lab", "PETG", "Black", "#000000"))
            .with_product(product("Creality", "PLA", "White", "#FFFFFF"));

        assert_eq!(catalog.find_products("bambu lab", None, None).len(), 2);
        assert_eq!(catalog.find_products("Bambu Lab", None, Some("pla")).len(), 1);
        assert_eq!(catalog.find_products("Creality", Some("ffffff"), None).len(), 1);
        assert!(catalog.find_products("Creality", Some("#000000"), None).is_empty());
    }

    #[test]
    fn test_shared_catalog_replace() {
        let shared = SharedCatalog::new(StaticCatalog::new());
        let before = shared.current();
        assert!(before.find_products("Bambu Lab", None, None).is_empty());

        shared.replace(
            StaticCatalog::new().with_product(product("Bambu Lab", "PLA", "Red", "#C12E1F")),
        );

        assert!(before.find_products("Bambu Lab", None, None).is_empty());
        assert_eq!(shared.current().find_products("Bambu Lab", None, None).len(), 1);
    }

    #[test]
    fn test_from_json() {
        let catalog = StaticCatalog::from_json(
            r##"{"products": [{"vendor": "Creality", "sku": "CR-1", "name": "Hyper PLA",
                 "material_type": "PLA", "color_name": "Black", "color_hex": "#000000"}]}"##,
        )
        .unwrap();
        assert!(catalog.mappings.is_empty());
        assert_eq!(catalog.products[0].url, None);
    }
}
