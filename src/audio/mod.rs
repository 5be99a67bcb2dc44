//! # Audio Module
//!
//! Per-guild playback for TuneCog.
//!
//! ## Architecture
//!
//! ### [`registry`] - Player Registry
//! - Exactly one [`player::GuildPlayer`] per guild, created lazily
//! - Process-wide teardown on shutdown
//!
//! ### [`player`] - Guild Player
//! - Owns the queue, the voice connection and the playback loop
//! - The loop plays one track at a time and survives per-track failures
//! - Volume (0.0–2.0), pause/resume, skip and a text progress bar
//!
//! ### [`queue`] - Queue Management
//! - Unbounded FIFO with an awaitable `pop`
//! - Immutable snapshots for listing and pagination
//!
//! ### [`voice`] - Voice Boundary
//! - Traits for connecting, playing and controlling audio
//! - songbird-backed implementation with a CONNECT permission pre-check
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let registry = PlayerRegistry::new(deps);
//! let player = registry.get_or_create(guild_id);
//!
//! player.connect(channel_id).await?;
//! player.enqueue(track);
//! player.set_volume(0.8);
//! println!("{}", player.progress());
//! ```

pub mod player;
pub mod queue;
pub mod registry;
pub mod voice;

pub use player::{GuildPlayer, PlaybackErrorSink, PlayerDeps};
pub use registry::PlayerRegistry;
pub use voice::SongbirdConnector;
