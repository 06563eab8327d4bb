//! Protocol configuration, its validation, and the silo roster.

use crate::he::ScalarParameters;
use crate::{Error, Result};
use std::fmt;
use std::path::Path;

/// Bounds shared by every party of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Dimension of every vector.
    pub dimension: usize,
    /// Coordinates lie in `[0, max_coordinate]`.
    pub max_coordinate: i64,
    /// Blinding factors are drawn in `[1, max_blinding_factor]`.
    pub max_blinding_factor: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            dimension: 128,
            max_coordinate: 100,
            max_blinding_factor: 100,
        }
    }
}

impl ProtocolConfig {
    /// Creates a configuration with the default bounds and the given
    /// dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    /// Largest squared distance between two valid vectors,
    /// `dimension * max_coordinate^2`, or `None` on overflow.
    pub fn max_distance(&self) -> Option<u128> {
        let c = u128::try_from(self.max_coordinate).ok()?;
        (self.dimension as u128).checked_mul(c.checked_mul(c)?)
    }

    /// Checks the bounds, and that no blinded value can wrap around the
    /// plaintext modulus of `parameters`.
    pub fn validate(&self, parameters: &ScalarParameters) -> Result<()> {
        validate_bounds(self)?;
        validate_safe_range(self, parameters.plaintext_modulus)
    }

    /// Checks that `values` has the configured dimension and that every
    /// coordinate lies in `[0, max_coordinate]`.
    pub fn check_vector(&self, values: &[i64]) -> Result<()> {
        if values.len() != self.dimension {
            return Err(Error::dimension_mismatch(self.dimension, values.len()));
        }
        match values
            .iter()
            .find(|v| !(0..=self.max_coordinate).contains(*v))
        {
            Some(v) => Err(Error::coordinate_out_of_range(*v, 0, self.max_coordinate)),
            None => Ok(()),
        }
    }
}

/// Validates that every bound is positive.
pub fn validate_bounds(config: &ProtocolConfig) -> Result<()> {
    if config.dimension == 0 {
        return Err(Error::Configuration(
            "Dimension must be at least 1".to_string(),
        ));
    }
    if config.max_coordinate < 1 {
        return Err(Error::Configuration(format!(
            "Maximum coordinate {} must be at least 1",
            config.max_coordinate
        )));
    }
    if config.max_blinding_factor == 0 {
        return Err(Error::Configuration(
            "Maximum blinding factor must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates `max_blinding_factor^2 * (max_distance + 1) < plaintext_modulus / 2`.
///
/// Both the perturbed value `r (d + 1)` and the blinded difference
/// `r r' (d - d')` then decrypt to themselves, so the sign of the difference
/// is never flipped by a wraparound.
pub fn validate_safe_range(config: &ProtocolConfig, plaintext_modulus: u64) -> Result<()> {
    let r = config.max_blinding_factor as u128;
    let bound = config
        .max_distance()
        .and_then(|d| d.checked_add(1))
        .and_then(|d| d.checked_mul(r.checked_mul(r)?));
    match bound {
        Some(b) if b < (plaintext_modulus / 2) as u128 => Ok(()),
        Some(b) => Err(Error::unsafe_parameters(format!(
            "blinded values reach {b}, plaintext modulus {plaintext_modulus} only represents magnitudes below {}",
            plaintext_modulus / 2
        ))),
        None => Err(Error::unsafe_parameters("blinded values overflow")),
    }
}

/// One silo of the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Address the silo listens on, `host:port`.
    pub address: String,
    /// Display name.
    pub name: String,
}

impl fmt::Display for RosterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// The silos known to a coordinator, in roster order.
///
/// The text form has the silo count on its first line, followed by one
/// `<address> <name>` line per silo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Creates a roster from entries; at least one is required.
    pub fn new(entries: Vec<RosterEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Configuration("The roster is empty".to_string()));
        }
        Ok(Self { entries })
    }

    /// Reads and parses a roster file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Parses the text form.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (line, count) = lines
            .next()
            .ok_or_else(|| Error::Configuration("The roster is empty".to_string()))?;
        let n: usize = count.parse().map_err(|_| {
            Error::Configuration(format!("Roster line {line}: invalid silo count {count:?}"))
        })?;

        let mut entries = Vec::with_capacity(n);
        for k in 0..n {
            let (line, text) = lines.next().ok_or_else(|| {
                Error::Configuration(format!("Roster lists {k} silos, expected {n}"))
            })?;
            let tokens: Vec<&str> = text.split_whitespace().collect();
            match tokens.as_slice() {
                [address, name] => entries.push(RosterEntry {
                    address: address.to_string(),
                    name: name.to_string(),
                }),
                _ => {
                    return Err(Error::Configuration(format!(
                        "Roster line {line}: expected \"<address> <name>\", found {text:?}"
                    )))
                }
            }
        }
        if let Some((line, text)) = lines.next() {
            return Err(Error::Configuration(format!(
                "Roster line {line}: unexpected entry {text:?}"
            )));
        }
        Self::new(entries)
    }

    /// The entries.
    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Number of silos.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: a roster holds at least one silo.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_safe() {
        let config = ProtocolConfig::default();
        assert_eq!(config.max_distance(), Some(1_280_000));
        assert!(config.validate(&ScalarParameters::default()).is_ok());
        assert!(config
            .validate(&ScalarParameters::insecure_for_tests())
            .is_ok());
    }

    #[test]
    fn unsafe_ranges_are_rejected() {
        let config = ProtocolConfig::default();
        let small = ScalarParameters {
            plaintext_modulus: 1 << 30,
            ..ScalarParameters::insecure_for_tests()
        };
        assert!(matches!(config.validate(&small), Err(Error::Configuration(_))));

        let config = ProtocolConfig {
            max_blinding_factor: 1 << 20,
            ..ProtocolConfig::default()
        };
        assert!(config.validate(&ScalarParameters::default()).is_err());

        let config = ProtocolConfig {
            max_coordinate: i64::MAX,
            ..ProtocolConfig::default()
        };
        assert!(config.validate(&ScalarParameters::default()).is_err());
    }

    #[test]
    fn boundary_of_safe_range() {
        // 10^2 * (2 * 1^2 + 1) = 300 must be below t / 2.
        let config = ProtocolConfig {
            dimension: 2,
            max_coordinate: 1,
            max_blinding_factor: 10,
        };
        assert!(validate_safe_range(&config, 602).is_ok());
        assert!(validate_safe_range(&config, 601).is_err());
        assert!(validate_safe_range(&config, 600).is_err());
    }

    #[test]
    fn invalid_bounds() {
        let base = ProtocolConfig::default();
        for config in [
            ProtocolConfig { dimension: 0, ..base },
            ProtocolConfig { max_coordinate: 0, ..base },
            ProtocolConfig { max_blinding_factor: 0, ..base },
        ] {
            assert!(validate_bounds(&config).is_err());
        }
        assert!(validate_bounds(&base).is_ok());
    }

    #[test]
    fn vectors_are_checked() {
        let config = ProtocolConfig {
            dimension: 3,
            max_coordinate: 10,
            max_blinding_factor: 10,
        };
        assert!(config.check_vector(&[0, 5, 10]).is_ok());
        assert!(config.check_vector(&[0, 5]).is_err());
        assert!(config.check_vector(&[0, 5, 11]).is_err());
        assert!(config.check_vector(&[-1, 5, 1]).is_err());
    }

    #[test]
    fn roster_parsing() -> Result<()> {
        let roster = Roster::parse("2\n127.0.0.1:50051 alice\n127.0.0.1:50052 bob\n")?;
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.entries()[1].name, "bob");
        assert_eq!(roster.entries()[0].address, "127.0.0.1:50051");
        assert_eq!(roster.entries()[0].to_string(), "alice (127.0.0.1:50051)");

        // Blank lines and surrounding whitespace are ignored.
        let roster = Roster::parse("\n 1 \n\n  host:1   carol  \n\n")?;
        assert_eq!(roster.entries()[0].name, "carol");
        Ok(())
    }

    #[test]
    fn malformed_rosters() {
        for text in [
            "",
            "zero\nhost:1 a",
            "0\n",
            "2\nhost:1 a\n",
            "1\nhost:1\n",
            "1\nhost:1 a extra\n",
            "1\nhost:1 a\nhost:2 b\n",
        ] {
            assert!(
                matches!(Roster::parse(text), Err(Error::Configuration(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn missing_roster_file() {
        assert!(matches!(
            Roster::from_path("/nonexistent/roster.txt"),
            Err(Error::Io(_))
        ));
    }
}
