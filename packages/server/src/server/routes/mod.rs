pub mod chat;
pub mod health;

pub use chat::message_handler;
pub use health::health_handler;
