//! Product catalog file (`knowledge/catalog.json`).

use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use agroquote_core::dialogue::parse;
use agroquote_core::domain::catalog::{Catalog, Category, Product, Unit, Variant};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    sku: String,
    #[serde(alias = "nombre")]
    name: String,
    #[serde(default, alias = "categoria")]
    category: Option<String>,
    #[serde(default, alias = "ingrediente_activo")]
    active_ingredient: Option<String>,
    #[serde(default, alias = "formulacion")]
    formulation: Option<String>,
    #[serde(default, alias = "dosis")]
    dose: Option<String>,
    #[serde(default, alias = "plaga")]
    targets: Vec<String>,
    #[serde(default, alias = "presentaciones")]
    presentations: Vec<String>,
    #[serde(default, alias = "imagen")]
    image_url: Option<String>,
}

impl CatalogEntry {
    fn into_product(self) -> Product {
        let labels: Vec<String> = self
            .presentations
            .into_iter()
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .collect();
        let unit = Unit::infer(labels.iter().map(String::as_str));
        let variants = labels
            .into_iter()
            .map(|label| {
                let (pack_size, pack_unit) = parse::pack_size(&label).unwrap_or((Decimal::ONE, unit));
                Variant { label, pack_size, unit: pack_unit }
            })
            .collect();

        Product {
            sku: self.sku.trim().to_string(),
            name: self.name.trim().to_string(),
            category: self.category.as_deref().and_then(Category::from_label),
            active_ingredient: self.active_ingredient.unwrap_or_default(),
            formulation: self.formulation.unwrap_or_default(),
            dose: self.dose.unwrap_or_default(),
            targets: self.targets.iter().take(5).cloned().collect::<Vec<_>>().join(", "),
            image_url: self.image_url.filter(|url| !url.trim().is_empty()),
            variants,
            unit,
        }
    }
}

/// Parses catalog JSON: an array of product entries. Entries without a SKU
/// or name are skipped.
pub fn parse_catalog(body: &str) -> Result<Catalog, serde_json::Error> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(body)?;
    Ok(Catalog::new(
        entries
            .into_iter()
            .filter(|entry| !entry.sku.trim().is_empty() && !entry.name.trim().is_empty())
            .map(CatalogEntry::into_product)
            .collect(),
    ))
}

pub fn load_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let body = fs::read_to_string(path)
        .map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })?;
    parse_catalog(&body).map_err(|source| CatalogError::Parse { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use agroquote_core::domain::catalog::{Category, Unit};

    use super::{load_catalog, parse_catalog, CatalogError};

    const SAMPLE: &str = r#"[
        {
            "sku": "FB-01",
            "nombre": "Fertimax Boro",
            "categoria": "Fertilizantes foliares",
            "ingrediente_activo": "Boro 10%",
            "formulacion": "SL",
            "dosis": "1 L/ha",
            "plaga": ["Deficiencia de boro"],
            "presentaciones": ["Bidón 5 L", "Bidón 20 L"]
        },
        {
            "sku": "SC-02",
            "name": "Sulfato Calcio",
            "category": "Acondicionador",
            "presentations": ["Bolsa 25 kg"],
            "imagen": "https://example.test/sc02.jpg"
        },
        { "sku": "", "nombre": "Sin código" }
    ]"#;

    #[test]
    fn spanish_and_english_field_names_are_accepted() {
        let catalog = parse_catalog(SAMPLE).expect("parse catalog");
        assert_eq!(catalog.len(), 2);

        let boro = catalog.by_sku("FB-01").expect("boro present");
        assert_eq!(boro.category, Some(Category::Fertilizer));
        assert_eq!(boro.unit, Unit::Liter);
        assert_eq!(boro.variants.len(), 2);
        assert_eq!(boro.variants[1].pack_size, Decimal::from(20));
        assert_eq!(boro.targets, "Deficiencia de boro");

        let calcium = catalog.by_sku("SC-02").expect("calcium present");
        assert_eq!(calcium.category, Some(Category::Conditioner));
        assert_eq!(calcium.single_variant().map(|variant| variant.unit), Some(Unit::Kilogram));
        assert!(calcium.image_url.is_some());
    }

    #[test]
    fn missing_file_reports_the_path() {
        let dir = TempDir::new().expect("tempdir");
        let error = load_catalog(&dir.path().join("catalog.json")).expect_err("missing file");
        assert!(matches!(error, CatalogError::Read { .. }));
        assert!(error.to_string().contains("catalog.json"));
    }
}
