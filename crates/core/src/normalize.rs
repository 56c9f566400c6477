//! Text repair for extracted PDF text and for model output.

/// Symbols that PDF extraction commonly mangles, with their ASCII stand-ins.
pub const SYMBOL_REPAIRS: [(&str, &str); 15] = [
    ("\u{f0e0}", "->"),
    ("\u{21d2}", "=>"),
    ("\u{2192}", "->"),
    ("\u{2190}", "<-"),
    ("\u{2013}", "-"),
    ("\u{2014}", "-"),
    ("\u{2022}", "-"),
    ("\u{201c}", "\""),
    ("\u{201d}", "\""),
    ("\u{2018}", "'"),
    ("\u{2019}", "'"),
    ("\u{2026}", "..."),
    ("\u{2264}", "<="),
    ("\u{2265}", ">="),
    ("\u{2260}", "!="),
];

const TIMES_SIGN: (char, &str) = ('\u{00d7}', "x");

const PRIVATE_USE: std::ops::RangeInclusive<char> = '\u{e000}'..='\u{f8ff}';

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Repairs known broken symbols, then collapses whitespace runs and trims.
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut repaired = text.to_string();
    for (bad, good) in SYMBOL_REPAIRS {
        if repaired.contains(bad) {
            repaired = repaired.replace(bad, good);
        }
    }
    repaired = repaired.replace(TIMES_SIGN.0, TIMES_SIGN.1);

    normalize_whitespace(&repaired)
}

pub fn normalize_optional(text: Option<&str>) -> String {
    text.map(normalize_text).unwrap_or_default()
}

/// Cleans generated answers before they reach the student. Private-use glyphs
/// are what broken PDF arrows turn into, so they become `->`. Layout is kept.
pub fn clean_output(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for character in text.chars() {
        if PRIVATE_USE.contains(&character) || character == '\u{2192}' {
            cleaned.push_str("->");
        } else if character == '\u{21d2}' {
            cleaned.push_str("=>");
        } else {
            cleaned.push(character);
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_whitespace_run(text: &str) -> bool {
        let mut previous_was_space = false;
        for character in text.chars() {
            let is_space = character.is_whitespace();
            if is_space && previous_was_space {
                return true;
            }
            previous_was_space = is_space;
        }
        false
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn broken_symbols_are_repaired() {
        let input = "Input \u{f0e0} output \u{21d2} result \u{2192} done \u{2013} \u{2022} item";
        assert_eq!(
            normalize_text(input),
            "Input -> output => result -> done - - item"
        );
    }

    #[test]
    fn smart_quotes_and_math_glyphs_become_ascii() {
        let input = "\u{201c}x \u{2264} y\u{201d} and \u{2018}a \u{2260} b\u{2019} 3 \u{00d7} 4\u{2026}";
        assert_eq!(normalize_text(input), "\"x <= y\" and 'a != b' 3 x 4...");
    }

    #[test]
    fn empty_and_missing_input_yield_empty_string() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_optional(None), "");
        assert_eq!(normalize_text(" \n\t "), "");
    }

    #[test]
    fn output_never_contains_mapped_symbols_or_whitespace_runs() {
        let samples = [
            "  leading and trailing  ",
            "\u{f0e0}\u{f0e0}  \u{2192}\n\n\u{21d2}",
            "mixed\u{00a0}\u{00a0}nbsp\u{2003}em space",
            "\u{2022}\t\u{2022}\r\n\u{2013}",
            "plain text",
        ];

        for sample in samples {
            let normalized = normalize_text(sample);
            for (bad, _) in SYMBOL_REPAIRS {
                assert!(!normalized.contains(bad), "{bad:?} left in {normalized:?}");
            }
            assert!(!has_whitespace_run(&normalized), "run in {normalized:?}");
            assert_eq!(normalized, normalized.trim());
        }
    }

    #[test]
    fn output_cleaner_strips_private_use_and_keeps_layout() {
        let input = "* **Step**\n\n- a \u{e001} b \u{2192} c \u{21d2} d \u{f8ff}";
        assert_eq!(clean_output(input), "* **Step**\n\n- a -> b -> c => d ->");
    }
}
