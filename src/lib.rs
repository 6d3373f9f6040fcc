//! Byte-stream adaptation layer between a record transport (L2: framing,
//! encryption, retransmission) and a message-layer protocol engine (the
//! handshake/alert/CCS/application-data consumer above it).
//!
//! [`splice`] provides the low-level writer/reader pair that splices a
//! consumer's variable-size logical writes/reads across a provider's
//! record-sized buffers, plus the "extended" pair that layers logical
//! message and nested-group size accounting on top. [`l2`] is the
//! collaborator contract this crate is built against. [`l3`] is the
//! content-framing driver: [`l3::L3Out`]/[`l3::L3In`] turn a caller's
//! handshake/alert/CCS/application-data/ack traffic into L2 records and
//! back.
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "logging")]
mod log {
    pub(crate) use log::{debug, trace};
}

#[cfg(not(feature = "logging"))]
mod log {
    pub(crate) macro_rules! trace ( ($($tt:tt)*) => {} );
    pub(crate) macro_rules! debug ( ($($tt:tt)*) => {} );
}

pub mod codec;
pub mod error;
pub mod l2;
pub mod l3;
pub mod proto;
pub mod splice;

pub use error::Error;
pub use l3::{ChannelState, HandshakeWrite, L3In, L3Out};
pub use proto::{Alert, AlertLevel, ContentType, Epoch, Protocol};
