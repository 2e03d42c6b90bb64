const TRUE_WORDS: [&str; 4] = ["1", "true", "yes", "on"];
const FALSE_WORDS: [&str; 4] = ["0", "false", "no", "off"];

/// Reads an on/off setting such as `RELAY_RUN_MIGRATIONS`. Missing or unrecognised values give `default`.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    value.as_deref().map(str::trim).and_then(flag_value).unwrap_or(default)
}

fn flag_value(word: &str) -> Option<bool> {
    if TRUE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word)) {
        Some(true)
    } else if FALSE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word)) {
        Some(false)
    } else {
        None
    }
}
