//! Minimal async rtnetlink client.
//!
//! Only the pieces the reconciliation engine needs: link, address and route
//! dumps, plus the handful of mutations (move a link between namespaces,
//! set it up, add or delete an address, add a default route).
//!
//! ```ignore
//! use netns_keeper::netlink::{Connection, namespace};
//!
//! let host = Connection::new()?;
//! let links = host.get_links().await?;
//!
//! let inside = namespace::connection_for("ha-test")?;
//! let routes = inside.get_routes().await?;
//! ```

pub mod attr;
pub mod builder;
pub mod connection;
pub mod error;
pub mod message;
pub mod messages;
pub mod namespace;
pub mod parse;
pub mod socket;
pub mod types;

pub use connection::Connection;
pub use error::{Error, Result};
pub use messages::{AddressMessage, LinkMessage, RouteMessage};
pub use socket::NetlinkSocket;
