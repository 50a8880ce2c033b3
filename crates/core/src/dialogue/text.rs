//! Text helpers shared by the parsers, intent detectors and matchers.

/// Lowercases, folds Spanish accents and collapses whitespace.
pub fn normalize(input: &str) -> String {
    let folded: String = input
        .chars()
        .flat_map(char::to_lowercase)
        .map(|ch| match ch {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            '’' => '\'',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized alphanumeric tokens, punctuation dropped.
pub fn tokens(input: &str) -> Vec<String> {
    normalize(input)
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Capitalizes every word and lowercases the rest ("juan PÉREZ" -> "Juan Pérez").
pub fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Truncates to at most `max` characters, never splitting a char.
pub fn clamp(input: &str, max: usize) -> String {
    let trimmed = input.trim();
    match trimmed.char_indices().nth(max) {
        Some((index, _)) => trimmed[..index].to_string(),
        None => trimmed.to_string(),
    }
}

/// True when `needle` appears in `haystack` as whole normalized words.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let haystack = format!(" {} ", tokens(haystack).join(" "));
    let needle = tokens(needle).join(" ");
    !needle.is_empty() && haystack.contains(&format!(" {needle} "))
}

#[cfg(test)]
mod tests {
    use super::{clamp, contains_phrase, normalize, title_case, tokens};

    #[test]
    fn normalize_folds_accents_and_spaces() {
        assert_eq!(normalize("  Maíz   de  INVIERNO "), "maiz de invierno");
        assert_eq!(normalize("Señor Muñoz"), "senor munoz");
    }

    #[test]
    fn tokens_drop_punctuation() {
        assert_eq!(tokens("¿Cuánto cuesta, el Glifosato?"), vec!["cuanto", "cuesta", "el", "glifosato"]);
    }

    #[test]
    fn title_case_fixes_shouting() {
        assert_eq!(title_case("juan PÉREZ"), "Juan Pérez");
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        assert_eq!(clamp("Añadir producto", 3), "Aña");
        assert_eq!(clamp("Sí", 20), "Sí");
    }

    #[test]
    fn phrases_match_on_word_boundaries() {
        assert!(contains_phrase("Hola, quiero hablar con un asesor", "hablar con"));
        assert!(!contains_phrase("nadamas", "nada mas"));
    }
}
