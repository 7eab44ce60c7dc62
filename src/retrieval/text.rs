//! Lightweight text matching helpers
//!
//! Tokenizing, stopword removal, crude stemming and the keyword families the
//! scoring engine checks queries against. Everything here works on
//! lower-cased input.

/// Words that carry no topical signal
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are",
    "as", "at", "be", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "him", "his", "i", "i'm",
    "if", "in", "into", "is", "it", "it's", "its", "just", "me", "more", "most", "my", "no",
    "nor", "not", "now", "of", "on", "once", "only", "or", "other", "our", "out", "over",
    "own", "same", "she", "so", "some", "such", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "through", "to", "too", "under",
    "until", "up", "very", "was", "we", "were", "when", "where", "which", "while", "who",
    "whom", "will", "with", "would", "you", "your",
];

/// Interrogatives shared between queries and question types
pub const INTERROGATIVES: &[&str] = &["how", "why", "what", "when", "where"];

/// Query words that signal a problem being worked on
pub const PROBLEM_INDICATORS: &[&str] = &[
    "error", "issue", "problem", "stuck", "help", "fix", "solve", "debug", "bug", "broken",
    "fail",
];

/// Query words that suggest a question needs reasoning across memories
pub const COMPLEX_INDICATORS: &[&str] = &[
    "how", "why", "explain", "relationship", "connected", "related",
];

/// Keywords per memory `context_type`
pub fn context_keywords(context_type: &str) -> &'static [&'static str] {
    match context_type.trim().to_lowercase().as_str() {
        "technical_state" | "technical" => {
            &["bug", "error", "fix", "implement", "code", "function"]
        }
        "breakthrough" => &["idea", "realized", "discovered", "insight", "solution"],
        "project_context" | "project_state" => &["project", "building", "architecture", "system"],
        "personal" | "relationship" => &["dear friend", "thank", "appreciate", "feel"],
        "unresolved" | "open_question" => &["todo", "need to", "should", "must", "problem"],
        "decision" | "technical_decision" => {
            &["decided", "chose", "will use", "approach", "strategy"]
        }
        _ => &[],
    }
}

/// Keywords per emotional resonance
pub fn emotion_keywords(emotion: &str) -> &'static [&'static str] {
    match emotion {
        "joy" => &["happy", "excited", "love", "wonderful", "great", "awesome"],
        "frustration" => &["stuck", "confused", "help", "issue", "problem", "why"],
        "discovery" => &["realized", "found", "discovered", "aha", "insight"],
        "gratitude" => &["thank", "appreciate", "grateful", "dear friend"],
        _ => &[],
    }
}

/// Lower-case and split on anything that is not alphanumeric or an apostrophe
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Tokens with stopwords removed
pub fn content_words(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|w| !is_stopword(w))
        .collect()
}

/// Strip common inflections: plurals, `-ing`, `-ed`
pub fn stem(word: &str) -> &str {
    let len = word.len();
    if len > 4 && word.ends_with("ies") {
        // "queries" → "quer", matching stem("query") below
        return &word[..len - 3];
    }
    if len > 3 && word.ends_with('y') {
        return &word[..len - 1];
    }
    if len > 5 && word.ends_with("ing") {
        return &word[..len - 3];
    }
    if len > 4 && word.ends_with("ed") {
        return &word[..len - 2];
    }
    if len > 4 && word.ends_with("es") {
        return &word[..len - 2];
    }
    if len > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return &word[..len - 1];
    }
    word
}

/// Whether a key word (or a simple variant of it) appears among the query words
pub fn word_found(key: &str, query_words: &[String]) -> bool {
    let key_stem = stem(key);
    query_words.iter().any(|w| {
        w == key
            || stem(w) == key_stem
            || (w.len() >= 3 && key.contains(w.as_str()))
            || (key_stem.len() >= 4 && w.contains(key_stem))
    })
}

/// Whether a lower-cased text contains a keyword.
///
/// Multi-word keywords match as substrings; single words match any token that
/// starts with them ("fixing" matches "fix").
pub fn contains_keyword(text_lower: &str, tokens: &[String], keyword: &str) -> bool {
    if keyword.contains(' ') {
        text_lower.contains(keyword)
    } else {
        tokens.iter().any(|t| t.starts_with(keyword))
    }
}

/// Number of keywords from `keywords` present in the text
pub fn count_keywords(text_lower: &str, tokens: &[String], keywords: &[&str]) -> usize {
    keywords
        .iter()
        .filter(|k| contains_keyword(text_lower, tokens, k))
        .count()
}

/// Whether the query deserves agent-assisted selection
pub fn is_complex_query(text: &str) -> bool {
    let tokens = tokenize(text);
    let keyword_hit = COMPLEX_INDICATORS
        .iter()
        .any(|k| tokens.iter().any(|t| t == k));
    keyword_hit || text.matches('?').count() > 1
}
