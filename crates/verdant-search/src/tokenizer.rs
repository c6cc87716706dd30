/// English function words dropped from both documents and queries.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "can", "need", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into",
    "through", "during", "before", "after", "above", "below", "between", "under", "again",
    "further", "then", "once", "and", "but", "or", "nor", "so", "yet", "both", "either",
    "neither", "not", "only", "own", "same", "than", "too", "very", "just", "also", "now",
    "here", "there", "when", "where", "why", "how", "all", "each", "every", "few", "more",
    "most", "other", "some", "such", "no", "any", "its", "it", "this", "that", "these",
    "those",
];

/// Lowercase `text`, replace every non-alphanumeric character with a space
/// and collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    let lowered: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into index terms: normalized words longer than one
/// character that are not stopwords. Duplicates are kept.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1 && !is_stopword(w))
        .collect()
}

/// Whether `term` (already lowercased) is on the stopword list.
pub fn is_stopword(term: &str) -> bool {
    STOPWORDS.contains(&term)
}
