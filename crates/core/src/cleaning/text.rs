/// Trims, collapses inner whitespace, and title-cases a free-text value.
///
/// A letter is upper-cased when it starts a word (follows a non-letter) and
/// lower-cased otherwise, so `o'NEIL  data-center` becomes `O'Neil Data-Center`.
pub fn normalize_text(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    let mut normalized = String::with_capacity(collapsed.len());
    let mut previous_is_letter = false;
    for character in collapsed.chars() {
        if character.is_alphabetic() {
            if previous_is_letter {
                normalized.extend(character.to_lowercase());
            } else {
                normalized.extend(character.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            normalized.push(character);
            previous_is_letter = false;
        }
    }
    normalized
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
