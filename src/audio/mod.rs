//! # Audio Module
//!
//! Per-guild queue and playback orchestration for tuberq.
//!
//! ## Architecture
//!
//! ### [`engine`] - Music Engine
//! - Public contract used by the command layer (`play`, `skip`, `pause`,
//!   `resume`, `stop`, `set_volume`, `leave`, `describe_queue`)
//! - Validates caller input and turns every outcome into a text notice
//!
//! ### [`player`] - Playback Controller
//! - State machine `Idle -> Connecting -> Playing <-> Paused -> Idle`
//! - Feeds streams to the per-guild player and advances on track end/error
//!
//! ### [`queue`] - Queue Store
//! - One `GuildQueue` per guild behind its own async mutex
//! - Every operation on a guild runs while holding that mutex
//!
//! ### [`voice`] - Voice Session Manager
//! - Idempotent connect, reconnection window, idempotent teardown
//!
//! ## Concurrency
//!
//! Guilds never share a lock. Track and connection events are delivered by
//! watcher tasks that re-enter through the guild mutex; events from a player
//! or session that has since been replaced carry a stale generation or
//! session id and are dropped.

pub mod engine;
pub mod notify;
pub mod player;
pub mod queue;
pub mod voice;

#[cfg(test)]
mod testing;

pub use engine::{CommandOrigin, MusicEngine};
pub use notify::Notifier;
pub use player::{LoadedTrack, TrackControl, TrackOutcome};
pub use queue::{PlaybackState, QueueSnapshot};
pub use voice::{ConnectionStatus, VoiceGateway, VoiceLink};
