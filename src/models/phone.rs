use std::fmt;

use serde::{Serialize, Serializer};

use crate::errors::AppError;

const COUNTRY_CODE: &str = "972";

/// A mobile number in canonical international form (`+9725XXXXXXXX`).
///
/// Customers type the local form `05XXXXXXXX`; inbound gateways report the
/// international one. Both parse to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Phone(String);

impl Phone {
    pub fn parse(input: &str) -> Result<Self, AppError> {
        let cleaned: String = input
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();

        let national = if let Some(rest) = cleaned.strip_prefix('+') {
            rest.strip_prefix(COUNTRY_CODE).map(|n| format!("0{n}"))
        } else if let Some(rest) = cleaned.strip_prefix(COUNTRY_CODE) {
            Some(format!("0{rest}"))
        } else {
            Some(cleaned)
        };

        match national {
            Some(n) if is_local_mobile(&n) => Ok(Phone(format!("+{COUNTRY_CODE}{}", &n[1..]))),
            _ => Err(AppError::validation(
                "phone",
                "invalid phone number (format: 05XXXXXXXX)",
            )),
        }
    }

    /// Rebuilds a phone from a stored canonical value without re-validating.
    pub fn from_canonical(s: String) -> Self {
        Phone(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_local(&self) -> String {
        match self.0.strip_prefix(&format!("+{COUNTRY_CODE}")) {
            Some(rest) => format!("0{rest}"),
            None => self.0.clone(),
        }
    }

    pub fn masked(&self) -> String {
        let s = &self.0;
        if s.len() <= 7 {
            return "****".to_string();
        }
        format!("{}****{}", &s[..s.len() - 7], &s[s.len() - 3..])
    }
}

fn is_local_mobile(s: &str) -> bool {
    s.len() == 10 && s.starts_with("05") && s.chars().all(|c| c.is_ascii_digit())
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Phone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_local())
    }
}
