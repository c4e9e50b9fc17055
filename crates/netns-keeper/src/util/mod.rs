//! Value types and validation shared by the engine and the CLI.

pub mod addr;
pub mod ifname;

pub use addr::{AddrError, Cidr, MacAddr};
pub use ifname::NameError;
