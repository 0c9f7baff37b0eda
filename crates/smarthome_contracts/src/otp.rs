#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, Validate};

pub const OTP_LEN_DEFAULT: usize = 4;
pub const OTP_LEN_MAX: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct OtpLength(usize);

impl OtpLength {
    pub fn new(len: usize) -> Result<Self, ContractViolation> {
        if len == 0 || len > OTP_LEN_MAX {
            return Err(ContractViolation::InvalidRange {
                field: "otp_length",
                min: 1.0,
                max: OTP_LEN_MAX as f64,
                got: len as f64,
            });
        }
        Ok(Self(len))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for OtpLength {
    fn default() -> Self {
        Self(OTP_LEN_DEFAULT)
    }
}

impl TryFrom<usize> for OtpLength {
    type Error = ContractViolation;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OtpLength> for usize {
    fn from(value: OtpLength) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OtpCode(String);

impl OtpCode {
    pub fn new(digits: impl Into<String>) -> Result<Self, ContractViolation> {
        let code = Self(digits.into());
        code.validate()?;
        Ok(code)
    }

    /// Builds a code of exactly `length` digits, taking each digit from
    /// `next_digit` reduced modulo 10.
    pub fn from_digit_fn(length: OtpLength, mut next_digit: impl FnMut() -> u8) -> Self {
        Self(
            (0..length.get())
                .map(|_| char::from(b'0' + next_digit() % 10))
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for OtpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OtpCode {
    type Error = ContractViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OtpCode> for String {
    fn from(value: OtpCode) -> Self {
        value.0
    }
}

impl Validate for OtpCode {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.is_empty() || self.0.len() > OTP_LEN_MAX {
            return Err(ContractViolation::InvalidRange {
                field: "otp_code.len",
                min: 1.0,
                max: OTP_LEN_MAX as f64,
                got: self.0.len() as f64,
            });
        }
        if !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ContractViolation::InvalidValue {
                field: "otp_code",
                reason: "must contain decimal digits only",
            });
        }
        Ok(())
    }
}
