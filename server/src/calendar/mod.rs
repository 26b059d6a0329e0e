mod client;
mod types;

pub(crate) use client::*;
pub(crate) use types::*;
