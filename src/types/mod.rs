pub mod account;
pub mod conversation;
pub mod events;
pub mod message;
