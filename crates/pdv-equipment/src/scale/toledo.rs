//! Toledo continuous/ENQ protocol.
//!
//! ```text
//!   ST,GS,+00012.345kg
//!   ── ── ──────────── weight field (last comma-separated), unit required
//!   │  └ gross / net
//!   └ ST stable, US in motion
//! ```

use super::{parse_magnitude, printable, ParsedWeight, ScaleBrand, ScaleProtocol};
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, Default)]
pub struct ToledoProtocol;

impl ScaleProtocol for ToledoProtocol {
    const BRAND: ScaleBrand = ScaleBrand::Toledo;

    fn parse(line: &str) -> Result<ParsedWeight, ParseError> {
        let clean = printable(line);
        if clean.is_empty() {
            return Err(ParseError::Empty);
        }

        let lower = clean.to_ascii_lowercase();
        if !lower.contains("kg") {
            return Err(ParseError::MissingUnit(clean));
        }

        let field = clean.rsplit(',').next().unwrap_or_default();
        let weight = parse_magnitude(field, &clean)?;

        let head = clean.split(',').next().unwrap_or_default().trim();
        let stable = head.eq_ignore_ascii_case("ST") || lower.contains("stable");

        Ok(ParsedWeight {
            weight,
            negative: field.contains('-'),
            stable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn kg(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_stable_gross() {
        let parsed = ToledoProtocol::parse("ST,GS,+00012.345kg").unwrap();
        assert_eq!(parsed.weight, kg("12.345"));
        assert!(parsed.stable);
        assert!(!parsed.negative);
    }

    #[test]
    fn test_in_motion_and_negative() {
        let parsed = ToledoProtocol::parse("US,NT,-00000.120kg\r").unwrap();
        assert_eq!(parsed.weight, kg("0.120"));
        assert!(parsed.negative);
        assert!(!parsed.stable);
    }

    #[test]
    fn test_stable_keyword() {
        let parsed = ToledoProtocol::parse("stable 1.5 KG").unwrap();
        assert_eq!(parsed.weight, kg("1.5"));
        assert!(parsed.stable);
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(ToledoProtocol::parse(""), Err(ParseError::Empty));
        assert_eq!(ToledoProtocol::parse("\u{2}\u{3}"), Err(ParseError::Empty));
        assert_eq!(
            ToledoProtocol::parse("ST,GS,+00012.345"),
            Err(ParseError::MissingUnit("ST,GS,+00012.345".to_string()))
        );
        // unit present but no digits is a failed read, not zero
        assert!(matches!(
            ToledoProtocol::parse("ST,GS,kg"),
            Err(ParseError::EmptyNumeric(_))
        ));
    }
}
