pub mod client;
pub mod controller;
pub mod model;
pub mod store;

pub use client::{ChatApi, ClientError, HttpChatClient};
pub use controller::{ChatController, ChatError, PendingRequest, RequestToken};
pub use model::{ChatSession, ChatSettings, Message, Role, SettingsPatch};
pub use store::{FileStore, MemoryStore, StateStore, StoreError};
