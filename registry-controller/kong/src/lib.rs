#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
pub mod transport;


pub use self::{
    client::KongClient,
    transport::{HttpTransport, Response, Transport},
};
