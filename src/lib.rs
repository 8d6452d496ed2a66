//! A single-shot DNS client speaking the wire protocol over UDP.
//!
//! A query is built and encoded ([`dns`]), sent with timeout-bounded retries
//! ([`contact`]), decoded, checked against the query ([`classify`]) and turned
//! into display lines ([`present`]). [`resolver::resolve`] ties the steps
//! together.

pub mod buffer;
pub mod classify;
pub mod cli;
pub mod contact;
pub mod dns;
pub mod logging;
pub mod present;
pub mod resolver;
pub mod types;

pub use classify::classify;
pub use cli::{Cli, ClientConfig};
pub use contact::{Attempt, Exchange, ExchangeState, Reply, Transport, UdpTransport};
pub use dns::{Message, Query};
pub use resolver::{resolve, Resolution};
pub use types::*;
