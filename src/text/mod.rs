//! Text normalization and query expansion.
//!
//! Pure functions over static synonym and stop-word tables, loaded once at
//! process start. Expansion output is a sorted set so it can feed stable
//! cache keys regardless of input word order.

use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Minimum token length kept by [`extract_keywords`] by default.
pub const DEFAULT_MIN_KEYWORD_LENGTH: usize = 3;

/// Domain synonym table (payroll/HR vocabulary).
///
/// Keys are lemmas; inflected variants of high-traffic terms are listed as
/// their own keys because lemmatization degrades to lowercasing (see
/// [`lemmatize`]).
static SYNONYMS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let entries: &[(&str, &[&str])] = &[
        // Зарплата
        (
            "зарплата",
            &["заработная плата", "з/п", "зп", "оплата труда", "выплата", "заработок"],
        ),
        (
            "зарплату",
            &["заработную плату", "з/п", "зп", "оплату труда", "выплату"],
        ),
        (
            "зарплаты",
            &["заработной платы", "з/п", "зп", "оплаты труда", "выплаты"],
        ),
        ("зп", &["зарплата", "заработная плата", "з/п", "оплата труда"]),
        ("з/п", &["зарплата", "заработная плата", "зп", "оплата труда"]),
        // Время
        ("когда", &["какого числа", "в какой день", "дата", "срок", "время"]),
        ("дата", &["число", "день", "срок", "когда"]),
        // Отпуск
        ("отпуск", &["отпускные", "отдых", "vacation", "каникулы"]),
        ("отпускные", &["отпуск", "отдых", "vacation"]),
        // Больничный
        ("больничный", &["больничный лист", "болезнь", "sick leave", "больничка"]),
        // Документы
        ("справка", &["документ", "бумага", "certificate"]),
        ("договор", &["контракт", "соглашение", "contract"]),
        // Выплаты
        ("премия", &["бонус", "надбавка", "поощрение"]),
        ("аванс", &["предоплата", "задаток"]),
        // Налоги
        ("налог", &["налоги", "сбор", "отчисление", "tax"]),
        ("ндфл", &["подоходный налог", "налог на доходы"]),
        // Работа
        ("работа", &["должность", "позиция", "job", "работать"]),
        ("уволиться", &["увольнение", "resign", "quit"]),
        // Время работы
        ("график", &["расписание", "режим работы", "schedule"]),
        ("удаленка", &["удаленная работа", "remote", "дистанционка"]),
        // Общие
        ("получить", &["оформить", "взять", "забрать"]),
        ("как", &["каким образом", "способ"]),
        ("где", &["место", "адрес", "локация"]),
    ];
    entries.iter().copied().collect()
});

/// Stop-words carrying no search signal.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "а", "в", "во", "вы", "да", "еще", "и", "или", "их", "к", "как", "не", "на", "но", "о",
        "об", "от", "по", "с", "со", "то", "у", "уже", "я",
    ]
    .into_iter()
    .collect()
});

const PUNCTUATION: &[char] = &['.', ',', '!', '?', ':', ';'];
const KEYWORD_PUNCTUATION: &[char] = &['.', ',', '!', '?', ':', ';', '-', '—'];

/// Normalizes a query: punctuation to spaces, lowercase, collapsed whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if PUNCTUATION.contains(&c) { ' ' } else { c })
        .collect();
    cleaned
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reduces a word to its base form.
///
/// No morphological analyzer is wired in, so this degrades to lowercasing.
/// It must never fail, only degrade; the synonym table compensates by
/// carrying inflected variants of its high-traffic keys.
#[must_use]
pub fn lemmatize(word: &str) -> String {
    word.to_lowercase()
}

/// Returns the synonyms for a word's lemma, if any.
#[must_use]
pub fn synonyms_for(word: &str) -> &'static [&'static str] {
    SYNONYMS
        .get(lemmatize(word).as_str())
        .copied()
        .unwrap_or(&[])
}

/// Returns true if the word is a stop-word.
#[must_use]
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Expands a query into original tokens, their lemmas, and synonym-table
/// lookups on each lemma.
///
/// Returned as a sorted set: expansion is order-independent by contract so
/// it can be used as a stable cache-key input.
#[must_use]
pub fn expand_query(query: &str) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();

    for word in query.to_lowercase().split_whitespace() {
        let clean = word.trim_matches(PUNCTUATION);
        if clean.is_empty() || is_stop_word(clean) {
            continue;
        }

        terms.insert(clean.to_string());

        let lemma = lemmatize(clean);
        for synonym in synonyms_for(&lemma) {
            terms.insert((*synonym).to_string());
        }
        terms.insert(lemma);
    }

    terms
}

/// Extracts search keywords from text: lemmatized, stop-words removed,
/// short tokens filtered by `min_length` (measured in characters).
#[must_use]
pub fn extract_keywords(text: &str, min_length: usize) -> BTreeSet<String> {
    let mut keywords = BTreeSet::new();

    for word in text.to_lowercase().split_whitespace() {
        let clean = word.trim_matches(KEYWORD_PUNCTUATION);
        if clean.is_empty() || clean.chars().count() < min_length {
            continue;
        }

        let lemma = lemmatize(clean);
        if is_stop_word(&lemma) {
            continue;
        }

        keywords.insert(lemma);
    }

    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("Когда  Зарплата?", "когда зарплата"; "punctuation and casing")]
    #[test_case("  график   работы  ", "график работы"; "collapsed whitespace")]
    #[test_case("", ""; "empty input")]
    fn test_normalize(input: &str, expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn test_lemmatize_never_fails_on_odd_input() {
        assert_eq!(lemmatize("ЗАРПЛАТА"), "зарплата");
        assert_eq!(lemmatize("2-НДФЛ"), "2-ндфл");
        assert_eq!(lemmatize(""), "");
    }

    #[test]
    fn test_expand_query_includes_synonyms() {
        let terms = expand_query("Когда зарплата?");
        assert!(terms.contains("зарплата"));
        assert!(terms.contains("з/п"));
        assert!(terms.contains("оплата труда"));
        assert!(terms.contains("какого числа"));
    }

    #[test]
    fn test_expand_query_drops_stop_words() {
        // "как" is a stop-word even though it has a synonym entry
        let terms = expand_query("как и в");
        assert!(terms.is_empty());
    }

    #[test]
    fn test_expand_query_is_order_independent() {
        let a = expand_query("отпуск зарплата");
        let b = expand_query("зарплата отпуск");
        assert_eq!(a, b);
    }

    #[test]
    fn test_extract_keywords_filters_short_and_stop_words() {
        let keywords = extract_keywords("Как оформить отпуск на 14 дней?", 3);
        assert!(keywords.contains("оформить"));
        assert!(keywords.contains("отпуск"));
        assert!(keywords.contains("дней"));
        // "как" is a stop-word, "на" and "14" are too short
        assert!(!keywords.contains("как"));
        assert!(!keywords.contains("на"));
        assert!(!keywords.contains("14"));
    }

    #[test]
    fn test_extract_keywords_min_length_counts_chars_not_bytes() {
        // Cyrillic is two bytes per char; "дни" must survive min_length 3
        let keywords = extract_keywords("дни", 3);
        assert!(keywords.contains("дни"));
    }

    proptest! {
        #[test]
        fn prop_expand_query_never_panics(query in ".{0,120}") {
            let _ = expand_query(&query);
        }

        #[test]
        fn prop_normalize_idempotent(query in ".{0,120}") {
            let once = normalize(&query);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn prop_expanded_terms_are_nonempty_and_trimmed(query in ".{0,80}") {
            for term in expand_query(&query) {
                prop_assert!(!term.is_empty());
                prop_assert_eq!(term.trim(), term.as_str());
            }
        }
    }
}
