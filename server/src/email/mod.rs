mod client;
mod ingest;
mod tasks;

pub(crate) use client::*;
pub(crate) use ingest::*;
pub(crate) use tasks::*;
