//! Typed rtnetlink messages parsed from dump responses.

mod address;
mod link;
mod route;

pub use address::AddressMessage;
pub use link::LinkMessage;
pub use route::RouteMessage;
