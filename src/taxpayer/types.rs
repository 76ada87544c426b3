//! Taxpayer records

use std::fmt;

use thiserror::Error;

/// CUIT length in digits
pub const CUIT_LEN: usize = 11;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CuitError {
    #[error("tax id is empty")]
    Empty,
    #[error("tax id contains non-numeric character '{0}'")]
    NonNumeric(char),
    #[error("tax id has {0} digits, at least 10 are required")]
    TooShort(usize),
}

/// Normalized 11-digit CUIT
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cuit(String);

impl Cuit {
    /// Normalize a raw tax id.
    ///
    /// Separators (`-`, `.`, `/`, whitespace) are dropped. Ten digits get a
    /// leading zero, more than eleven are cut to the first eleven.
    pub fn parse(raw: &str) -> Result<Self, CuitError> {
        let mut digits = String::with_capacity(CUIT_LEN);
        for c in raw.trim().chars() {
            match c {
                '0'..='9' => digits.push(c),
                '-' | '.' | '/' => {}
                c if c.is_whitespace() => {}
                c => return Err(CuitError::NonNumeric(c)),
            }
        }

        match digits.len() {
            0 => Err(CuitError::Empty),
            n if n < CUIT_LEN - 1 => Err(CuitError::TooShort(n)),
            n if n == CUIT_LEN - 1 => Ok(Self(format!("0{}", digits))),
            _ => {
                digits.truncate(CUIT_LEN);
                Ok(Self(digits))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the taxpayer listing
#[derive(Clone, PartialEq, Eq)]
pub struct Taxpayer {
    pub name: String,
    pub cuit: Cuit,
    /// Clave fiscal
    pub credential: String,
}

impl Taxpayer {
    pub fn new(name: impl Into<String>, cuit: Cuit, credential: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cuit,
            credential: credential.into(),
        }
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for Taxpayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Taxpayer")
            .field("name", &self.name)
            .field("cuit", &self.cuit)
            .field("credential", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eleven_digits_unchanged() {
        assert_eq!(Cuit::parse("20123456789").unwrap().as_str(), "20123456789");
    }

    #[test]
    fn test_ten_digits_left_padded() {
        assert_eq!(Cuit::parse("2012345678").unwrap().as_str(), "02012345678");
    }

    #[test]
    fn test_long_id_truncated() {
        assert_eq!(Cuit::parse("2012345678912").unwrap().as_str(), "20123456789");
    }

    #[test]
    fn test_separators_removed() {
        assert_eq!(Cuit::parse(" 20-12345678-9 ").unwrap().as_str(), "20123456789");
        assert_eq!(Cuit::parse("20.123.456.789").unwrap().as_str(), "20123456789");
    }

    #[test]
    fn test_rejected_ids() {
        assert_eq!(Cuit::parse(""), Err(CuitError::Empty));
        assert_eq!(Cuit::parse("--"), Err(CuitError::Empty));
        assert_eq!(Cuit::parse("20A23456789"), Err(CuitError::NonNumeric('A')));
        assert_eq!(Cuit::parse("123456789"), Err(CuitError::TooShort(9)));
    }

    #[test]
    fn test_debug_hides_credential() {
        let taxpayer = Taxpayer::new("Juan Perez", Cuit::parse("20123456789").unwrap(), "s3cret");
        let printed = format!("{:?}", taxpayer);
        assert!(printed.contains("Juan Perez"));
        assert!(!printed.contains("s3cret"));
    }
}
