//! ---
//! drover_section: "01-execution-core"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "SI-suffixed count parsing for cycle and rate grammars."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
//! Count parsing with SI suffixes, as used by the `cycles` and `rate`
//! parameter grammars. `"5k"` is five thousand cycles, `"1.2M"` is 1.2
//! million ops. Underscores and commas are accepted as digit separators.

/// Parse a count with an optional SI suffix into a double.
///
/// Returns `None` when the input is not a number, or when the suffix is not
/// one of `k`, `m`, `b`, `g`, `t` (case-insensitive).
pub fn double_count_for(spec: &str) -> Option<f64> {
    let cleaned: String = spec
        .trim()
        .chars()
        .filter(|c| *c != '_' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (digits, multiplier) = match cleaned.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => {
            let head = &cleaned[..cleaned.len() - 1];
            let mult = match c.to_ascii_lowercase() {
                'k' => 1e3,
                'm' => 1e6,
                'b' | 'g' => 1e9,
                't' => 1e12,
                _ => return None,
            };
            (head, mult)
        }
        _ => (cleaned.as_str(), 1.0),
    };

    digits.parse::<f64>().ok().map(|v| v * multiplier)
}

/// Parse a count with an optional SI suffix into a u64.
///
/// Fractional results are rejected only by truncation; `"1.5k"` yields 1500.
/// Negative values yield `None`.
pub fn long_count_for(spec: &str) -> Option<u64> {
    let value = double_count_for(spec)?;
    if value < 0.0 || value > u64::MAX as f64 {
        return None;
    }
    Some(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_numbers_pass_through() {
        assert_eq!(long_count_for("100"), Some(100));
        assert_eq!(double_count_for("0.25"), Some(0.25));
    }

    #[test]
    fn suffixes_scale() {
        assert_eq!(long_count_for("5k"), Some(5_000));
        assert_eq!(long_count_for("1.5K"), Some(1_500));
        assert_eq!(long_count_for("2M"), Some(2_000_000));
        assert_eq!(long_count_for("1b"), Some(1_000_000_000));
        assert_eq!(long_count_for("1t"), Some(1_000_000_000_000));
    }

    #[test]
    fn separators_are_ignored() {
        assert_eq!(long_count_for("1_000_000"), Some(1_000_000));
        assert_eq!(long_count_for("1,000"), Some(1_000));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(long_count_for("tenk"), None);
        assert_eq!(long_count_for("10q"), None);
        assert_eq!(long_count_for(""), None);
        assert_eq!(long_count_for("-5"), None);
    }
}
