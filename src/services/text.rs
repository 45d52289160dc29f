use once_cell::sync::Lazy;
use regex::Regex;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static SYMBOLS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Lower-cases and strips digits and punctuation, leaving single-spaced words.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let no_digits = DIGITS.replace_all(&lowered, "");
    let no_symbols = SYMBOLS.replace_all(&no_digits, "");
    SPACES.replace_all(&no_symbols, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_noise() {
        assert_eq!(
            normalize("  Mi auto   hace RUIDO al frenar!!! (desde 2023) "),
            "mi auto hace ruido al frenar desde"
        );
    }

    #[test]
    fn test_normalize_keeps_accents() {
        assert_eq!(normalize("¿Cuánto cuesta el AFINAMIENTO?"), "cuánto cuesta el afinamiento");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for text in [
            "Cambio de aceite: 5W-30 , sintético",
            "a , b ; c",
            "\tTabs\nand\r\nnewlines ",
            "",
            "1234 !!!",
        ] {
            let once = normalize(text);
            assert_eq!(normalize(&once), once, "input: {text:?}");
        }
    }

    #[test]
    fn test_normalize_symbols_do_not_leave_double_spaces() {
        assert_eq!(normalize("frenos , discos"), "frenos discos");
    }
}
