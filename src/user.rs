use crate::error::{JerichoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Group member callsigns. A group has between two and seven members and
/// always contains alpha and bravo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Callsign {
    Alpha,
    Bravo,
    Charlie,
    Delta,
    Echo,
    Foxtrot,
    Golf,
}

impl Callsign {
    pub const ALL: [Callsign; 7] = [
        Callsign::Alpha,
        Callsign::Bravo,
        Callsign::Charlie,
        Callsign::Delta,
        Callsign::Echo,
        Callsign::Foxtrot,
        Callsign::Golf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Callsign::Alpha => "alpha",
            Callsign::Bravo => "bravo",
            Callsign::Charlie => "charlie",
            Callsign::Delta => "delta",
            Callsign::Echo => "echo",
            Callsign::Foxtrot => "foxtrot",
            Callsign::Golf => "golf",
        }
    }

    /// Single ASCII byte used for the user on the wire
    pub fn letter(&self) -> u8 {
        self.as_str().as_bytes()[0]
    }

    pub fn from_letter(letter: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.letter() == letter)
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Callsign {
    type Err = JerichoError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| JerichoError::UnknownUser(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_are_unique() {
        for (i, a) in Callsign::ALL.iter().enumerate() {
            for b in &Callsign::ALL[i + 1..] {
                assert_ne!(a.letter(), b.letter());
            }
        }
    }

    #[test]
    fn test_letter_lookup() {
        assert_eq!(Callsign::from_letter(b'c'), Some(Callsign::Charlie));
        assert_eq!(Callsign::from_letter(b'g'), Some(Callsign::Golf));
        assert_eq!(Callsign::from_letter(b'z'), None);
        assert_eq!(Callsign::from_letter(b'A'), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("Foxtrot".parse::<Callsign>().unwrap(), Callsign::Foxtrot);
        assert!("hotel".parse::<Callsign>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Callsign::Delta).unwrap();
        assert_eq!(json, "\"delta\"");
    }
}
