//! Argument validation for commands that shell out to network tools.
//!
//! Every user-supplied host, domain or port passes through
//! [`ShellInputValidator::validate`] before it is placed on a command line.
//! Validation never rewrites the input into something acceptable: a value is
//! either returned unchanged (ports in canonical decimal form) or rejected.
//!
//! Rules:
//!   - host: an IPv4 literal must fall inside one of the configured CIDR
//!     blocks; anything else must be a plain hostname of `[A-Za-z0-9.-]`
//!   - domain: hostname grammar only, never IP-checked
//!   - port: decimal 1..=65535
//!   - port range: `start-end`, ordered, spanning at most 1000 ports

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use netwarden_core::NetwardenError;
use thiserror::Error;

const MAX_HOST_LEN: usize = 255;
const MAX_PORT_SPAN: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Host,
    Domain,
    Port,
    PortRange,
}

impl FromStr for InputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(InputKind::Host),
            "domain" => Ok(InputKind::Domain),
            "port" => Ok(InputKind::Port),
            "port_range" | "port-range" => Ok(InputKind::PortRange),
            other => Err(format!("unknown input kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("input is empty")]
    Empty,
    #[error("input is {len} characters long (max {max})", max = MAX_HOST_LEN)]
    TooLong { len: usize },
    #[error("input contains characters outside [A-Za-z0-9.-]")]
    InvalidCharacters,
    #[error("input must not start with '-'")]
    LeadingHyphen,
    #[error("malformed IPv4 address")]
    MalformedAddress,
    #[error("IPv6 addresses are not supported")]
    UnsupportedAddress,
    #[error("{0} is outside the allowed networks")]
    NotWhitelisted(Ipv4Addr),
    #[error("port must be a number between 1 and 65535")]
    InvalidPort,
    #[error("port range must be 'start-end' with 1 <= start <= end <= 65535")]
    InvalidPortRange,
    #[error("port range spans {span} ports (max {max})", max = MAX_PORT_SPAN)]
    RangeTooWide { span: u32 },
}

/// An IPv4 network such as `10.0.0.0/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrBlock {
    network: u32,
    mask: u32,
}

impl CidrBlock {
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask == self.network
    }
}

impl FromStr for CidrBlock {
    type Err = NetwardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NetwardenError::InvalidCidr(s.to_string());
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u32 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }
        let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
        Ok(Self {
            network: u32::from(addr) & mask,
            mask,
        })
    }
}

/// Validates command arguments against a fixed set of allowed networks.
#[derive(Debug, Clone)]
pub struct ShellInputValidator {
    whitelist: Vec<CidrBlock>,
}

impl ShellInputValidator {
    /// Parse every CIDR entry up front; one bad entry fails construction.
    pub fn new(cidrs: &[String]) -> netwarden_core::Result<Self> {
        let whitelist = cidrs
            .iter()
            .map(|c| c.parse())
            .collect::<netwarden_core::Result<Vec<CidrBlock>>>()?;
        Ok(Self { whitelist })
    }

    pub fn validate(&self, input: &str, kind: InputKind) -> Result<String, ValidationError> {
        match kind {
            InputKind::Host => self.validate_host(input),
            InputKind::Domain => validate_hostname(input),
            InputKind::Port => parse_port(input).map(|p| p.to_string()),
            InputKind::PortRange => validate_port_range(input),
        }
    }

    fn validate_host(&self, input: &str) -> Result<String, ValidationError> {
        check_length(input)?;
        match input.parse::<IpAddr>() {
            Ok(IpAddr::V4(addr)) => {
                if self.whitelist.iter().any(|block| block.contains(addr)) {
                    Ok(input.to_string())
                } else {
                    Err(ValidationError::NotWhitelisted(addr))
                }
            }
            Ok(IpAddr::V6(_)) => Err(ValidationError::UnsupportedAddress),
            // inet_aton still resolves short, octal and hex forms, so anything
            // made only of numeric labels is a broken IP literal, not a hostname.
            Err(_) if is_numeric_literal(input) => Err(ValidationError::MalformedAddress),
            Err(_) => validate_hostname(input),
        }
    }
}

// ---------------------------------------------------------------------------
// Hostnames
// ---------------------------------------------------------------------------

fn check_length(input: &str) -> Result<(), ValidationError> {
    if input.is_empty() {
        return Err(ValidationError::Empty);
    }
    if input.len() > MAX_HOST_LEN {
        return Err(ValidationError::TooLong { len: input.len() });
    }
    Ok(())
}

fn is_numeric_literal(input: &str) -> bool {
    input.split('.').all(|label| {
        match label.strip_prefix("0x").or_else(|| label.strip_prefix("0X")) {
            Some(digits) => !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()),
            None => label.chars().all(|c| c.is_ascii_digit()),
        }
    })
}

fn validate_hostname(input: &str) -> Result<String, ValidationError> {
    check_length(input)?;
    if !input
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ValidationError::InvalidCharacters);
    }
    // Would be read as an option flag by ping, dig and friends.
    if input.starts_with('-') {
        return Err(ValidationError::LeadingHyphen);
    }
    Ok(input.to_string())
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

fn parse_port(input: &str) -> Result<u32, ValidationError> {
    if input.is_empty() || input.len() > 5 || !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPort);
    }
    match input.parse::<u32>() {
        Ok(port @ 1..=65535) => Ok(port),
        _ => Err(ValidationError::InvalidPort),
    }
}

fn validate_port_range(input: &str) -> Result<String, ValidationError> {
    let (start, end) = input
        .split_once('-')
        .ok_or(ValidationError::InvalidPortRange)?;
    let start = parse_port(start).map_err(|_| ValidationError::InvalidPortRange)?;
    let end = parse_port(end).map_err(|_| ValidationError::InvalidPortRange)?;
    if start > end {
        return Err(ValidationError::InvalidPortRange);
    }
    let span = end - start;
    if span > MAX_PORT_SPAN {
        return Err(ValidationError::RangeTooWide { span });
    }
    Ok(format!("{start}-{end}"))
}
