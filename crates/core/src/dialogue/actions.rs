use crate::dialogue::options::{
    self, ChoiceOption, CROPS, CROP_OTHER, DEPARTMENTS, HECTARES, HECTARES_OTHER, SEASONS, SUBZONES,
};
use crate::domain::catalog::Category;

/// Structured replies the customer can tap. Decoded once from the button or
/// list row id; unknown ids decode to `None` and fall back to the title text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractiveAction {
    Department(&'static str),
    Subzone(&'static str),
    Crop(&'static str),
    CropOther,
    Hectares(&'static str),
    HectaresOther,
    Season(&'static str),
    Category(Category),
    CategoryMore(usize),
    Product(String),
    Variant { sku: String, index: usize },
    AddMore,
    NoMore,
    Continue,
    Finalize,
    ReferralYes(String),
    ReferralNo,
}

fn label_for(options: &[ChoiceOption], payload: &str) -> Option<&'static str> {
    options::by_payload(options, payload).map(|option| option.label)
}

fn payload_for(options: &[ChoiceOption], label: &str) -> String {
    options
        .iter()
        .find(|option| option.label == label)
        .map(|option| option.payload.to_string())
        .unwrap_or_default()
}

impl InteractiveAction {
    pub fn decode(id: &str) -> Option<Self> {
        let id = id.trim();
        match id {
            "ADD_MORE" => return Some(Self::AddMore),
            "NO_MORE" => return Some(Self::NoMore),
            "QR_SEGUIR" => return Some(Self::Continue),
            "QR_FINALIZAR" => return Some(Self::Finalize),
            "REF_NO" => return Some(Self::ReferralNo),
            "CROP_OTRO" => return Some(Self::CropOther),
            "HA_OTRA" => return Some(Self::HectaresOther),
            _ => {}
        }

        if let Some(offset) = id.strip_prefix("CAT_MORE_") {
            return offset.parse().ok().map(Self::CategoryMore);
        }
        if let Some(key) = id.strip_prefix("CAT_") {
            return Category::from_payload_key(key).map(Self::Category);
        }
        if let Some(rest) = id.strip_prefix("PRES_") {
            let (sku, index) = rest.rsplit_once("__")?;
            let index = index.parse().ok()?;
            return (!sku.is_empty()).then(|| Self::Variant { sku: sku.to_string(), index });
        }
        if let Some(sku) = id.strip_prefix("PROD_") {
            return (!sku.is_empty()).then(|| Self::Product(sku.to_string()));
        }
        if let Some(sku) = id.strip_prefix("REF_YES_") {
            return (!sku.is_empty()).then(|| Self::ReferralYes(sku.to_string()));
        }

        if id.starts_with("DPTO_") {
            return label_for(&DEPARTMENTS, id).map(Self::Department);
        }
        if id.starts_with("SUBZ_") {
            return label_for(&SUBZONES, id).map(Self::Subzone);
        }
        if id.starts_with("CROP_") {
            return label_for(&CROPS, id).map(Self::Crop);
        }
        if id.starts_with("HA_") {
            return label_for(&HECTARES, id).map(Self::Hectares);
        }
        if id.starts_with("CAMP_") {
            return label_for(&SEASONS, id).map(Self::Season);
        }
        None
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Department(label) => payload_for(&DEPARTMENTS, label),
            Self::Subzone(label) => payload_for(&SUBZONES, label),
            Self::Crop(label) => payload_for(&CROPS, label),
            Self::CropOther => CROP_OTHER.payload.to_string(),
            Self::Hectares(label) => payload_for(&HECTARES, label),
            Self::HectaresOther => HECTARES_OTHER.payload.to_string(),
            Self::Season(label) => payload_for(&SEASONS, label),
            Self::Category(category) => format!("CAT_{}", category.payload_key()),
            Self::CategoryMore(offset) => format!("CAT_MORE_{offset}"),
            Self::Product(sku) => format!("PROD_{sku}"),
            Self::Variant { sku, index } => format!("PRES_{sku}__{index}"),
            Self::AddMore => "ADD_MORE".to_string(),
            Self::NoMore => "NO_MORE".to_string(),
            Self::Continue => "QR_SEGUIR".to_string(),
            Self::Finalize => "QR_FINALIZAR".to_string(),
            Self::ReferralYes(sku) => format!("REF_YES_{sku}"),
            Self::ReferralNo => "REF_NO".to_string(),
        }
    }
}
