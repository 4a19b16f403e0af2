//! Block-list filtering of model output.

/// Remove every occurrence of each block-list word from `text`.
///
/// Words are removed one after another, in list order, with plain substring
/// replacement: no regex, no case folding, no word boundaries. Because each
/// removal sees the output of the previous one, overlapping entries are order
/// dependent (`["a", "ab"]` and `["ab", "a"]` can give different results).
/// Empty words are skipped.
pub fn filter_words<S: AsRef<str>>(text: &str, words: &[S]) -> String {
    words
        .iter()
        .map(AsRef::as_ref)
        .filter(|word| !word.is_empty())
        .fold(text.to_string(), |acc, word| acc.replace(word, ""))
}
