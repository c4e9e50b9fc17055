//! Parser combinators and the `FromNetlink` trait for typed rtnetlink messages.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use winnow::binary::le_u16;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;

use super::attr::{NLA_TYPE_MASK, nla_align};
use super::error::{Error, Result};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Trait for types that can be parsed from netlink wire format.
pub trait FromNetlink: Sized {
    /// Parse from a mutable byte slice reference (the payload after nlmsghdr).
    fn parse(input: &mut &[u8]) -> PResult<Self>;

    /// Parse from a complete payload.
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut input = data;
        Self::parse(&mut input).map_err(|e| Error::Parse(format!("{:?}", e)))
    }

    /// Write the family header a dump request for this type needs.
    fn write_dump_header(_buf: &mut Vec<u8>) {}
}

/// A hard parse failure.
pub(crate) fn cut() -> ErrMode<ContextError> {
    ErrMode::Cut(ContextError::new())
}

/// Split a fixed-size family header off the front of the input.
pub(crate) fn parse_header<'a>(input: &mut &'a [u8], size: usize) -> PResult<&'a [u8]> {
    if input.len() < size {
        return Err(cut());
    }
    take(size).parse_next(input)
}

/// Parse one attribute and return (type without flags, payload).
pub(crate) fn parse_attr<'a>(input: &mut &'a [u8]) -> PResult<(u16, &'a [u8])> {
    let len = le_u16.parse_next(input)? as usize;
    let attr_type = le_u16.parse_next(input)?;

    if len < 4 || input.len() < len - 4 {
        return Err(cut());
    }

    let payload: &[u8] = take(len - 4).parse_next(input)?;

    let padding = nla_align(len) - len;
    if input.len() >= padding {
        let _: &[u8] = take(padding).parse_next(input)?;
    } else {
        *input = &[];
    }

    Ok((attr_type & NLA_TYPE_MASK, payload))
}

/// Parse every attribute left in the input, stopping at the first malformed one.
pub(crate) fn parse_attrs<'a>(input: &mut &'a [u8]) -> Vec<(u16, &'a [u8])> {
    let mut attrs = Vec::new();
    while input.len() >= 4 {
        match parse_attr(input) {
            Ok(attr) => attrs.push(attr),
            Err(_) => break,
        }
    }
    attrs
}

/// Parse a string from a fixed-size buffer (null-terminated).
pub fn parse_string_from_bytes(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Parse a native-endian u32 attribute payload.
pub fn parse_u32_ne(data: &[u8]) -> Option<u32> {
    data.get(..4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_ne_bytes)
}

/// Parse an IP address based on address family.
pub fn parse_ip_addr(data: &[u8], family: u8) -> Result<IpAddr> {
    match i32::from(family) {
        libc::AF_INET => {
            let octets: [u8; 4] = data
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or(Error::Truncated {
                    expected: 4,
                    actual: data.len(),
                })?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        libc::AF_INET6 => {
            let octets: [u8; 16] = data
                .get(..16)
                .and_then(|b| b.try_into().ok())
                .ok_or(Error::Truncated {
                    expected: 16,
                    actual: data.len(),
                })?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => Err(Error::InvalidMessage(format!(
            "unknown address family: {}",
            family
        ))),
    }
}
