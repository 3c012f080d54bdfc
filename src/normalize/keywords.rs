use crate::config::MatchOrder;
use crate::product::Characteristics;
use crate::utils::non_empty;

/// Lower-cased synonym list, matched as substrings of lower-cased keys
#[derive(Debug, Clone)]
pub struct Synonyms {
    terms: Vec<String>,
}

impl Synonyms {
    pub fn new(terms: &[String]) -> Self {
        Self {
            terms: terms
                .iter()
                .map(|term| term.trim().to_lowercase())
                .filter(|term| !term.is_empty())
                .collect(),
        }
    }

    /// Length in characters of the longest synonym contained in `key`
    fn best_match(&self, key: &str) -> Option<usize> {
        let key = key.to_lowercase();
        self.terms
            .iter()
            .filter(|term| key.contains(term.as_str()))
            .map(|term| term.chars().count())
            .max()
    }

    pub fn matches(&self, key: &str) -> bool {
        self.best_match(key).is_some()
    }
}

/// Value of the key chosen by `order` among keys containing a synonym.
///
/// The chosen key decides: an empty value there means absent, other
/// matching keys are not consulted.
pub fn keyword_scan(characteristics: &Characteristics, synonyms: &Synonyms, order: MatchOrder) -> Option<String> {
    let chosen = match order {
        MatchOrder::Insertion => characteristics
            .iter()
            .find(|(key, _)| synonyms.matches(key))
            .map(|(_, value)| value),
        MatchOrder::Specificity => {
            let mut best: Option<(usize, &String)> = None;
            for (key, value) in characteristics {
                if let Some(score) = synonyms.best_match(key) {
                    if best.map_or(true, |(top, _)| score > top) {
                        best = Some((score, value));
                    }
                }
            }
            best.map(|(_, value)| value)
        }
    };
    chosen.and_then(|value| non_empty(value))
}

/// First key containing a synonym whose value is non-empty
pub fn secondary_scan(characteristics: &Characteristics, synonyms: &Synonyms) -> Option<String> {
    characteristics
        .iter()
        .filter(|(key, _)| synonyms.matches(key))
        .find_map(|(_, value)| non_empty(value))
}

/// Value stored under the first of `keys` present with a non-empty value
pub fn exact_lookup(characteristics: &Characteristics, keys: &[String]) -> Option<String> {
    keys.iter()
        .filter_map(|key| characteristics.get(key))
        .find_map(|value| non_empty(value))
}

/// First palette entry occurring in `text`, case-insensitively, returned in palette spelling
pub fn palette_match(text: &str, palette: &[String]) -> Option<String> {
    let text = text.to_lowercase();
    palette
        .iter()
        .find(|color| !color.trim().is_empty() && text.contains(&color.trim().to_lowercase()))
        .map(|color| color.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, &str)]) -> Characteristics {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn synonyms(terms: &[&str]) -> Synonyms {
        Synonyms::new(&terms.iter().map(|t| t.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_case_and_whitespace_variants_first_wins() {
        let color = synonyms(&["колір", "цвет", "color"]);
        let chars = rows(&[(" КОЛІР ", "Black"), ("Колір корпусу", "Blue")]);
        assert_eq!(keyword_scan(&chars, &color, MatchOrder::Insertion), Some("Black".to_string()));

        let chars = rows(&[("Колір корпусу", "Blue"), (" КОЛІР ", "Black")]);
        assert_eq!(keyword_scan(&chars, &color, MatchOrder::Insertion), Some("Blue".to_string()));
    }

    #[test]
    fn test_case_only_key_variants_both_match() {
        let color = synonyms(&["колір", "цвет", "color"]);

        let chars = rows(&[("Колір", "Black"), ("колір", "White")]);
        assert_eq!(keyword_scan(&chars, &color, MatchOrder::Insertion), Some("Black".to_string()));
        assert_eq!(secondary_scan(&chars, &color), Some("Black".to_string()));

        let chars = rows(&[("колір", "White"), ("Колір", "Black")]);
        assert_eq!(keyword_scan(&chars, &color, MatchOrder::Insertion), Some("White".to_string()));
        assert_eq!(secondary_scan(&chars, &color), Some("White".to_string()));

        let chars = rows(&[("колір", ""), ("Колір", "Black")]);
        assert_eq!(secondary_scan(&chars, &color), Some("Black".to_string()));
    }

    #[test]
    fn test_whitespace_only_key_variants_both_match() {
        let color = synonyms(&["колір"]);

        let chars = rows(&[("Колір", "Black"), (" Колір ", "White")]);
        assert_eq!(chars.len(), 2);
        assert_eq!(keyword_scan(&chars, &color, MatchOrder::Insertion), Some("Black".to_string()));

        let chars = rows(&[(" Колір ", "White"), ("Колір", "Black")]);
        assert_eq!(keyword_scan(&chars, &color, MatchOrder::Insertion), Some("White".to_string()));
        assert_eq!(keyword_scan(&chars, &color, MatchOrder::Specificity), Some("White".to_string()));
    }

    #[test]
    fn test_empty_first_match_is_absent() {
        let color = synonyms(&["колір"]);
        let chars = rows(&[("Колір", ""), ("Колір корпусу", "Blue")]);

        assert_eq!(keyword_scan(&chars, &color, MatchOrder::Insertion), None);
        assert_eq!(secondary_scan(&chars, &color), Some("Blue".to_string()));
    }

    #[test]
    fn test_specificity_prefers_longest_synonym() {
        let memory = synonyms(&["вбудована пам'ять", "пам"]);
        let chars = rows(&[("Оперативна пам'ять", "6 ГБ"), ("Вбудована пам'ять", "128 ГБ")]);

        assert_eq!(keyword_scan(&chars, &memory, MatchOrder::Insertion), Some("6 ГБ".to_string()));
        assert_eq!(keyword_scan(&chars, &memory, MatchOrder::Specificity), Some("128 ГБ".to_string()));
    }

    #[test]
    fn test_specificity_ties_keep_insertion_order() {
        let color = synonyms(&["колір"]);
        let chars = rows(&[("Колір корпусу", "Blue"), ("Колір", "Black")]);
        assert_eq!(keyword_scan(&chars, &color, MatchOrder::Specificity), Some("Blue".to_string()));
    }

    #[test]
    fn test_exact_lookup() {
        let chars = rows(&[("Колір", "  "), ("Виробник", "Apple")]);
        let keys = vec!["Виробник".to_string(), "Manufacturer".to_string()];

        assert_eq!(exact_lookup(&chars, &keys), Some("Apple".to_string()));
        assert_eq!(exact_lookup(&chars, &["Колір".to_string()]), None);
        assert_eq!(exact_lookup(&chars, &["виробник".to_string()]), None);
    }

    #[test]
    fn test_palette_match() {
        let palette: Vec<String> = ["Black", "White", "Blue"].iter().map(|c| c.to_string()).collect();

        assert_eq!(palette_match("Apple iPhone 15 128GB Black", &palette), Some("Black".to_string()));
        assert_eq!(palette_match("apple iphone 15 blue", &palette), Some("Blue".to_string()));
        assert_eq!(palette_match("Apple iPhone 15", &palette), None);
    }
}
