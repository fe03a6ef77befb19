#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod admin;
mod args;

pub use self::args::{parse_duration, Args};
