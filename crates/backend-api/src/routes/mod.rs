pub mod auth;
pub mod chat;
pub mod comments;
pub mod health;
pub mod likes;
pub mod media;
pub mod models;
pub mod notifications;
pub mod posts;
pub mod reactions;
pub mod users;
pub mod websocket;
