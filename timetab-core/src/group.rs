//! Group identifier derivation.

/// Derive a short stable identifier from a human-entered group label.
///
/// Prefers the leading digit run (e.g. "104б__Философия" -> "104"); otherwise
/// a lowercase alphanumeric slug; "grp" when nothing usable remains.
pub fn group_id_from_name(name: &str) -> String {
    let s = name.trim();

    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if !digits.is_empty() {
        return digits;
    }

    let slugged = slug::slugify(s).replace('-', "");
    if slugged.is_empty() {
        "grp".to_string()
    } else {
        slugged
    }
}
