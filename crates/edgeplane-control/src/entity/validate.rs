//! Field-level validation rules shared by entity variants.

use std::fmt;
use std::net::IpAddr;

/// A failed validation rule, phrased as `<field> <rule>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(String);

impl ValidationError {
    /// Create a validation error with a custom message.
    #[must_use]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// The field does not hold a valid identifier.
    #[must_use]
    pub fn invalid_id(field: &str) -> Self {
        Self(format!("{field} not a valid identifier"))
    }

    /// A required field is empty.
    #[must_use]
    pub fn empty(field: &str) -> Self {
        Self(format!("{field} cannot be empty"))
    }

    /// The field value is outside the accepted set.
    #[must_use]
    pub fn one_of(field: &str, accepted: &[&str]) -> Self {
        Self(format!("{field} must be one of {}", accepted.join(", ")))
    }

    /// The message without the "Validation failed" prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ValidationError {}

pub(crate) fn require_id(field: &str, value: &str) -> Result<(), ValidationError> {
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| ValidationError::invalid_id(field))
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::empty(field));
    }
    Ok(())
}

pub(crate) fn require_one_of(
    field: &str,
    value: &str,
    accepted: &[&str],
) -> Result<(), ValidationError> {
    if accepted.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::one_of(field, accepted))
    }
}

pub(crate) fn require_range<T>(
    field: &str,
    value: T,
    range: std::ops::RangeInclusive<T>,
) -> Result<(), ValidationError>
where
    T: PartialOrd + fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new(format!(
            "{field} must be in [{}..{}]",
            range.start(),
            range.end()
        )))
    }
}

pub(crate) fn require_ip(field: &str, value: &str) -> Result<(), ValidationError> {
    value
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new(format!("{field} not a valid IP address")))
}

/// Accepts a bare address or `address/prefix`.
pub(crate) fn require_ip_or_cidr(field: &str, value: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::new(format!("{field} not a valid IP or CIDR"));

    let Some((addr, prefix)) = value.split_once('/') else {
        return value.parse::<IpAddr>().map(|_| ()).map_err(|_| invalid());
    };

    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(invalid());
    }
    Ok(())
}

/// Accepts `host:port` with a non-zero numeric port.
pub(crate) fn require_host_port(field: &str, value: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::new(format!("{field} not a valid host:port"));

    let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(invalid()),
    }
}
