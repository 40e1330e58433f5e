pub mod autoreply;
pub mod config;
pub mod filter;
pub mod llm;
pub mod monitor;
pub mod ratelimit;
pub mod telegram_log;
