mod socket;
mod tls;

pub(crate) use socket::{connect, NetSocket};
pub(crate) use tls::wrap;
