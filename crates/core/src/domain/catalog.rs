use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::dialogue::text::normalize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Liter,
    Kilogram,
    Unit,
}

impl Unit {
    pub fn label(self) -> &'static str {
        match self {
            Self::Liter => "L",
            Self::Kilogram => "Kg",
            Self::Unit => "Unid",
        }
    }

    /// Maps a quantity token such as `lts`, `kilos` or `unidades` to a unit.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = normalize(token);
        match token.as_str() {
            "l" | "lt" | "lts" | "litro" | "litros" => Some(Self::Liter),
            "kg" | "kgs" | "kilo" | "kilos" => Some(Self::Kilogram),
            "u" | "und" | "unid" | "unidad" | "unidades" => Some(Self::Unit),
            _ => None,
        }
    }

    /// Guesses the selling unit from presentation labels; kilograms win ties.
    pub fn infer<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut liters = false;
        for label in labels {
            let normalized = normalize(label);
            let tokens: Vec<&str> = normalized
                .split(|ch: char| !ch.is_ascii_alphanumeric())
                .filter(|token| !token.is_empty())
                .collect();
            if tokens.iter().any(|token| token.ends_with("kg") || *token == "kilos") {
                return Self::Kilogram;
            }
            if tokens.iter().any(|token| {
                matches!(*token, "l" | "lt" | "lts" | "litro" | "litros")
                    || token.strip_suffix('l').is_some_and(|rest| rest.parse::<u32>().is_ok())
                    || token.strip_suffix("lt").is_some_and(|rest| rest.parse::<u32>().is_ok())
            }) {
                liters = true;
            }
        }
        if liters {
            Self::Liter
        } else {
            Self::Kilogram
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Fertilizer,
    Biostimulant,
    Conditioner,
    DefenseInducer,
}

impl Category {
    pub const ALL: [Category; 4] =
        [Self::Fertilizer, Self::Biostimulant, Self::Conditioner, Self::DefenseInducer];

    pub fn label(self) -> &'static str {
        match self {
            Self::Fertilizer => "Fertilizante",
            Self::Biostimulant => "Bioestimulante",
            Self::Conditioner => "Acondicionador",
            Self::DefenseInducer => "Inductor de Defensa",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Self::Fertilizer => "Fertilizantes",
            Self::Biostimulant => "Bioestimulantes",
            Self::Conditioner => "Acondicionadores",
            Self::DefenseInducer => "Inductores de Defensa",
        }
    }

    pub fn payload_key(self) -> &'static str {
        match self {
            Self::Fertilizer => "FERTILIZANTE",
            Self::Biostimulant => "BIOESTIMULANTE",
            Self::Conditioner => "ACONDICIONADOR",
            Self::DefenseInducer => "INDUCTOR_DEFENSA",
        }
    }

    pub fn from_payload_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.payload_key() == key)
    }

    /// Loose match used for both catalog labels and customer text.
    pub fn from_label(text: &str) -> Option<Self> {
        let text = normalize(text);
        if text.contains("fertiliz") {
            Some(Self::Fertilizer)
        } else if text.contains("bioestimul") {
            Some(Self::Biostimulant)
        } else if text.contains("acondicion") {
            Some(Self::Conditioner)
        } else if text.contains("inductor") || text.contains("defensa") {
            Some(Self::DefenseInducer)
        } else {
            None
        }
    }
}

/// One sellable presentation of a product. Orders must be whole multiples of
/// `pack_size`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub label: String,
    pub pack_size: Decimal,
    pub unit: Unit,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub sku: String,
    pub name: String,
    pub category: Option<Category>,
    pub active_ingredient: String,
    pub formulation: String,
    pub dose: String,
    pub targets: String,
    pub image_url: Option<String>,
    pub variants: Vec<Variant>,
    pub unit: Unit,
}

impl Product {
    pub fn single_variant(&self) -> Option<&Variant> {
        match self.variants.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn variant(&self, label: &str) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.label == label)
    }

    pub fn presentations(&self) -> String {
        self.variants.iter().map(|variant| variant.label.as_str()).collect::<Vec<_>>().join(", ")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn by_sku(&self, sku: &str) -> Option<&Product> {
        self.products.iter().find(|product| product.sku == sku)
    }

    pub fn in_category(&self, category: Category) -> Vec<&Product> {
        self.products.iter().filter(|product| product.category == Some(category)).collect()
    }
}
