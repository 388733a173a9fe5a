//! Turning recognized text into integer tokens.

use ot_core::ascii_digit;

/// Maps Bengali digits to ASCII and every other non-digit to a space.
pub fn normalize_digits(text: &str) -> String {
    text.chars().map(|c| ascii_digit(c).unwrap_or(' ')).collect()
}

/// Splits recognized text into the integers it contains, in reading order.
///
/// Digit runs too long for an `i64` are dropped; they cannot be odometer values.
pub fn digit_tokens(text: &str) -> Vec<i64> {
    normalize_digits(text)
        .split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_digits_become_separators() {
        assert_eq!(normalize_digits("ODO:12,345km"), "    12 345  ");
    }

    #[test]
    fn bengali_digits_are_mapped() {
        assert_eq!(normalize_digits("১২৩৪৫"), "12345");
        assert_eq!(digit_tokens("মিটার ১০৮৫০ কিমি"), vec![10_850]);
    }

    #[test]
    fn other_scripts_are_separators() {
        assert_eq!(digit_tokens("١٢٣ 456"), vec![456]);
    }

    #[test]
    fn tokens_in_reading_order() {
        assert_eq!(
            digit_tokens("12:45  TRIP 99.4\nODO 012345\n"),
            vec![12, 45, 99, 4, 12_345]
        );
    }

    #[test]
    fn empty_and_digitless_text() {
        assert!(digit_tokens("").is_empty());
        assert!(digit_tokens("no numbers here").is_empty());
    }

    #[test]
    fn overlong_runs_are_dropped() {
        assert_eq!(digit_tokens("99999999999999999999999 7"), vec![7]);
    }
}
