//! Bridges a blocky-sandbox game's voice chat into a chat-service voice
//! channel: joins the game server as a player, opens the mod's encrypted
//! UDP voice session, and transcodes audio in both directions.

pub mod auth;
pub mod bridge;
pub mod chat;
pub mod config;
pub mod minecraft;
pub mod udp;
