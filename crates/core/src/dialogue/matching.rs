use strsim::normalized_levenshtein;

use crate::dialogue::text::{normalize, tokens};
use crate::domain::catalog::{Catalog, Product};

pub const FUZZY_THRESHOLD: f64 = 0.75;
const MIN_INGREDIENT_TOKEN: usize = 3;

/// How a free-text query resolved against the catalog.
#[derive(Clone, Debug, PartialEq)]
pub enum ProductMatch<'a> {
    Exact(&'a Product),
    Ingredient(&'a Product),
    /// More than one active-ingredient hit; the customer picks from a list.
    Ambiguous(Vec<&'a Product>),
    Fuzzy { product: &'a Product, similarity: f64 },
}

impl<'a> ProductMatch<'a> {
    pub fn single(&self) -> Option<&'a Product> {
        match self {
            Self::Exact(product) | Self::Ingredient(product) => Some(product),
            Self::Fuzzy { product, .. } => Some(product),
            Self::Ambiguous(_) => None,
        }
    }
}

pub struct ProductMatcher<'a> {
    catalog: &'a Catalog,
    threshold: f64,
}

impl<'a> ProductMatcher<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog, threshold: FUZZY_THRESHOLD }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Name match first, then active ingredient, then edit distance.
    pub fn find(&self, query: &str) -> Option<ProductMatch<'a>> {
        let query_text = normalize(query);
        if query_text.chars().filter(|ch| ch.is_alphanumeric()).count() < MIN_INGREDIENT_TOKEN {
            return None;
        }

        if let Some(product) = self.by_name(&query_text) {
            return Some(ProductMatch::Exact(product));
        }

        let hits = self.by_ingredient(&query_text);
        match hits.len() {
            0 => {}
            1 => return Some(ProductMatch::Ingredient(hits[0])),
            _ => return Some(ProductMatch::Ambiguous(hits)),
        }

        self.fuzzy(&query_text)
            .map(|(product, similarity)| ProductMatch::Fuzzy { product, similarity })
    }

    /// The text contains the full product name, or every word of it.
    fn by_name(&self, query_text: &str) -> Option<&'a Product> {
        let query_tokens = tokens(query_text);
        let padded = format!(" {} ", query_tokens.join(" "));

        self.catalog
            .products()
            .iter()
            .filter(|product| {
                let name_tokens = tokens(&product.name);
                !name_tokens.is_empty()
                    && (padded.contains(&format!(" {} ", name_tokens.join(" ")))
                        || name_tokens.iter().all(|token| query_tokens.contains(token)))
            })
            .max_by_key(|product| product.name.len())
    }

    /// Every query word of three or more letters appears in the ingredient text.
    fn by_ingredient(&self, query_text: &str) -> Vec<&'a Product> {
        let query_tokens: Vec<String> = tokens(query_text)
            .into_iter()
            .filter(|token| token.chars().count() >= MIN_INGREDIENT_TOKEN)
            .collect();
        if query_tokens.is_empty() {
            return Vec::new();
        }

        self.catalog
            .products()
            .iter()
            .filter(|product| {
                let ingredient = normalize(&product.active_ingredient);
                !ingredient.is_empty()
                    && query_tokens.iter().all(|token| ingredient.contains(token.as_str()))
            })
            .collect()
    }

    /// Best-scoring name at or above the threshold. Each query word is scored
    /// on its own as well as the whole query, so a misspelled single-word name
    /// inside a longer message still counts.
    fn fuzzy(&self, query_text: &str) -> Option<(&'a Product, f64)> {
        let mut candidates: Vec<String> = tokens(query_text)
            .into_iter()
            .filter(|token| token.chars().count() >= MIN_INGREDIENT_TOKEN)
            .collect();
        candidates.push(query_text.to_string());

        self.catalog
            .products()
            .iter()
            .filter_map(|product| {
                let name = normalize(&product.name);
                candidates
                    .iter()
                    .map(|candidate| normalized_levenshtein(candidate, &name))
                    .fold(None, |best: Option<f64>, score| {
                        Some(best.map_or(score, |current| current.max(score)))
                    })
                    .filter(|score| *score >= self.threshold)
                    .map(|score| (product, score))
            })
            .max_by(|left, right| left.1.total_cmp(&right.1))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ProductMatch, ProductMatcher};
    use crate::domain::catalog::{Catalog, Category, Product, Unit, Variant};

    fn product(sku: &str, name: &str, ingredient: &str) -> Product {
        Product {
            sku: sku.to_string(),
            name: name.to_string(),
            category: Some(Category::Fertilizer),
            active_ingredient: ingredient.to_string(),
            formulation: String::new(),
            dose: String::new(),
            targets: String::new(),
            image_url: None,
            variants: vec![Variant {
                label: "Bolsa 25 kg".to_string(),
                pack_size: Decimal::from(25),
                unit: Unit::Kilogram,
            }],
            unit: Unit::Kilogram,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            product("GF-01", "Glifosato Max", "Glifosato 48% SL"),
            product("BK-02", "Boro Kelp", "Boro 10% + extracto de algas"),
            product("BZ-03", "Boro Zinc", "Boro 5% + Zinc 8%"),
        ])
    }

    #[test]
    fn exact_name_inside_a_sentence() {
        let catalog = catalog();
        let matcher = ProductMatcher::new(&catalog);
        let found = matcher.find("quiero cotizar boro kelp por favor").expect("name match");
        assert!(matches!(found, ProductMatch::Exact(product) if product.sku == "BK-02"));
    }

    #[test]
    fn ingredient_tokens_must_all_match() {
        let catalog = catalog();
        let matcher = ProductMatcher::new(&catalog);

        let found = matcher.find("zinc").expect("single ingredient hit");
        assert!(matches!(found, ProductMatch::Ingredient(product) if product.sku == "BZ-03"));

        let found = matcher.find("boro").expect("ambiguous ingredient hits");
        assert!(matches!(found, ProductMatch::Ambiguous(ref products) if products.len() == 2));
        assert_eq!(found.single(), None);
    }

    #[test]
    fn fuzzy_accepts_close_misspellings_only() {
        let catalog = catalog();
        let matcher = ProductMatcher::new(&catalog);

        let found = matcher.find("glifosatto max").expect("fuzzy match above threshold");
        match found {
            ProductMatch::Fuzzy { product, similarity } => {
                assert_eq!(product.sku, "GF-01");
                assert!(similarity >= 0.75);
            }
            other => panic!("expected fuzzy match, got {other:?}"),
        }

        assert_eq!(matcher.find("gasolina"), None);
    }

    #[test]
    fn very_short_queries_are_ignored() {
        let catalog = catalog();
        assert_eq!(ProductMatcher::new(&catalog).find("ok"), None);
    }
}
