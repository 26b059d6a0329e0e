pub mod prelude;
pub mod queries;
pub mod unknown_senders;
