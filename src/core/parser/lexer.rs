/// Characters that separate tokens: space, tab, CR, LF and bell.
const DELIMITERS: &[char] = &[' ', '\t', '\r', '\n', '\x07'];

/// Splits `line` into maximal runs of non-delimiter characters.
///
/// There is no quoting or escaping, so operators are only recognized when they
/// stand alone: `a|b` is a single word.
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split(DELIMITERS).filter(|t| !t.is_empty()).collect()
}
