mod admin;
mod allowlist;
mod app_router;
mod clients;
mod email_tasks;
mod schedule;
mod unknown_senders;

pub use app_router::AppRouter;
