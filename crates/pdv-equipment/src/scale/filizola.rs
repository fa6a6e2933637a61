//! Filizola protocol. Formats vary by model: `000.000`, `+000.000`,
//! `S000.000` (leading `S` = stable).

use super::{parse_magnitude, printable, ParsedWeight, ScaleBrand, ScaleProtocol};
use crate::error::ParseError;

const PREFIX_MARKERS: &[char] = &['S', 'W', '+', '-'];

#[derive(Debug, Clone, Copy, Default)]
pub struct FilizolaProtocol;

impl ScaleProtocol for FilizolaProtocol {
    const BRAND: ScaleBrand = ScaleBrand::Filizola;

    fn parse(line: &str) -> Result<ParsedWeight, ParseError> {
        let clean = printable(line);
        if clean.is_empty() {
            return Err(ParseError::Empty);
        }

        let body = clean.trim_start_matches(PREFIX_MARKERS);
        let prefix = &clean[..clean.len() - body.len()];
        let weight = parse_magnitude(body, &clean)?;

        Ok(ParsedWeight {
            weight,
            negative: prefix.contains('-') || body.trim_start().starts_with('-'),
            stable: clean.starts_with('S') || clean.to_ascii_lowercase().contains("stable"),
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
    fn test_formats() {
        let plain = FilizolaProtocol::parse("002.500").unwrap();
        assert_eq!(plain.weight, kg("2.5"));
        assert!(!plain.stable);

        let stable = FilizolaProtocol::parse("S001.250\r").unwrap();
        assert_eq!(stable.weight, kg("1.250"));
        assert!(stable.stable);

        let negative = FilizolaProtocol::parse("S-000.008").unwrap();
        assert_eq!(negative.weight, kg("0.008"));
        assert!(negative.negative);
        assert!(negative.stable);

        let weighing = FilizolaProtocol::parse("W+003.000 kg").unwrap();
        assert_eq!(weighing.weight, kg("3"));
        assert!(!weighing.stable);
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(FilizolaProtocol::parse("  "), Err(ParseError::Empty));
        assert!(matches!(
            FilizolaProtocol::parse("SW+-"),
            Err(ParseError::EmptyNumeric(_))
        ));
        assert!(matches!(
            FilizolaProtocol::parse("ERR"),
            Err(ParseError::EmptyNumeric(_))
        ));
    }
}
