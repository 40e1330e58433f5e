//! Business-message auto-reply: decide, assemble context, draft, deliver.

pub mod admin;
pub mod birthday;
pub mod connections;
pub mod context;
pub mod crm;
pub mod database;
pub mod gate;
pub mod message;
pub mod pipeline;
pub mod profile;
pub mod sender;
pub mod settings;
pub mod telegram;


pub use admin::Admin;
pub use connections::{ConnectionInfo, ConnectionRegistry};
pub use database::Database;
pub use message::InboundMessage;
pub use pipeline::{Outcome, Secretary, SecretaryConfig};
pub use sender::{Delivery, Format, Messenger, OutgoingMessage};
pub use telegram::TelegramClient;
