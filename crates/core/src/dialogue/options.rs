//! Fixed choice lists offered by the qualification questions.

use crate::dialogue::text::{contains_phrase, normalize, tokens};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChoiceOption {
    pub payload: &'static str,
    pub label: &'static str,
}

const fn option(payload: &'static str, label: &'static str) -> ChoiceOption {
    ChoiceOption { payload, label }
}

pub const FLAGSHIP_DEPARTMENT: &str = "Santa Cruz";

pub const DEPARTMENTS: [ChoiceOption; 9] = [
    option("DPTO_SANTA_CRUZ", "Santa Cruz"),
    option("DPTO_COCHABAMBA", "Cochabamba"),
    option("DPTO_LA_PAZ", "La Paz"),
    option("DPTO_CHUQUISACA", "Chuquisaca"),
    option("DPTO_TARIJA", "Tarija"),
    option("DPTO_ORURO", "Oruro"),
    option("DPTO_POTOSI", "Potosí"),
    option("DPTO_BENI", "Beni"),
    option("DPTO_PANDO", "Pando"),
];

pub const SUBZONES: [ChoiceOption; 5] = [
    option("SUBZ_NORTE", "Norte"),
    option("SUBZ_ESTE", "Este"),
    option("SUBZ_SUR", "Sur"),
    option("SUBZ_VALLES", "Valles"),
    option("SUBZ_CHIQUITANIA", "Chiquitania"),
];

pub const CROPS: [ChoiceOption; 5] = [
    option("CROP_SOYA", "Soya"),
    option("CROP_MAIZ", "Maíz"),
    option("CROP_TRIGO", "Trigo"),
    option("CROP_ARROZ", "Arroz"),
    option("CROP_GIRASOL", "Girasol"),
];

pub const CROP_OTHER: ChoiceOption = option("CROP_OTRO", "Otro");

/// Normalized spelling -> canonical crop label.
const CROP_SYNONYMS: [(&str, &str); 7] = [
    ("soya", "Soya"),
    ("soja", "Soya"),
    ("maiz", "Maíz"),
    ("trigo", "Trigo"),
    ("arroz", "Arroz"),
    ("girasol", "Girasol"),
    ("maravilla", "Girasol"),
];

pub const HECTARES: [ChoiceOption; 6] = [
    option("HA_0_100", "0–100 ha"),
    option("HA_101_300", "101–300 ha"),
    option("HA_301_500", "301–500 ha"),
    option("HA_1000_3000", "1,000–3,000 ha"),
    option("HA_3001_5000", "3,001–5,000 ha"),
    option("HA_5000_MAS", "+5,000 ha"),
];

pub const HECTARES_OTHER: ChoiceOption = option("HA_OTRA", "Otras cantidades");

pub const SEASONS: [ChoiceOption; 2] =
    [option("CAMP_VERANO", "Verano"), option("CAMP_INVIERNO", "Invierno")];

pub fn by_payload(options: &[ChoiceOption], payload: &str) -> Option<ChoiceOption> {
    options.iter().copied().find(|option| option.payload == payload)
}

/// Finds the option whose label appears in free text.
pub fn by_text(options: &[ChoiceOption], text: &str) -> Option<ChoiceOption> {
    options.iter().copied().find(|option| contains_phrase(text, option.label))
}

pub fn department_from_text(text: &str) -> Option<&'static str> {
    by_text(&DEPARTMENTS, text).map(|option| option.label).or_else(|| {
        let normalized = normalize(text);
        ["scz", "santacruz"]
            .iter()
            .any(|alias| tokens(&normalized).iter().any(|token| token == alias))
            .then_some(FLAGSHIP_DEPARTMENT)
    })
}

pub fn is_flagship(department: &str) -> bool {
    department == FLAGSHIP_DEPARTMENT
}

/// Every crop named in the text, in order of first mention, without repeats.
pub fn crops_from_text(text: &str) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = Vec::new();
    for token in tokens(text) {
        let hit = CROP_SYNONYMS.iter().find(|(synonym, _)| *synonym == token);
        if let Some((_, label)) = hit {
            if !found.contains(label) {
                found.push(label);
            }
        }
    }
    found
}

pub fn season_from_text(text: &str) -> Option<&'static str> {
    by_text(&SEASONS, text).map(|option| option.label)
}
