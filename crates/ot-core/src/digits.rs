//! Digit scripts riders type or photograph.
//!
//! Meters and keyboards in the bot's region show either ASCII or Bengali
//! digits. Other Unicode digits are not numbers here.

/// The ASCII digit for an ASCII or Bengali digit, `None` for anything else.
pub fn ascii_digit(c: char) -> Option<char> {
    match c {
        '0'..='9' => Some(c),
        '\u{09E6}'..='\u{09EF}' => char::from_digit(u32::from(c) - 0x09E6, 10),
        _ => None,
    }
}

/// Rewrites Bengali digits as ASCII and leaves every other character alone.
pub fn to_ascii_digits(text: &str) -> String {
    text.chars().map(|c| ascii_digit(c).unwrap_or(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_both_scripts() {
        assert_eq!(ascii_digit('7'), Some('7'));
        assert_eq!(ascii_digit('\u{09E6}'), Some('0'));
        assert_eq!(ascii_digit('\u{09EF}'), Some('9'));
    }

    #[test]
    fn other_digits_are_not_numbers() {
        // Arabic-Indic and fullwidth digits.
        assert_eq!(ascii_digit('\u{0663}'), None);
        assert_eq!(ascii_digit('\u{FF15}'), None);
        assert_eq!(ascii_digit('x'), None);
    }

    #[test]
    fn rewrites_in_place() {
        assert_eq!(to_ascii_digits("/km ১২৩৪৫.৫"), "/km 12345.5");
        assert_eq!(to_ascii_digits("١٢٣"), "١٢٣");
    }
}
