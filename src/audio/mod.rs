//! # Audio Module
//!
//! Playback engine for one voice session per guild.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Engine
//! - [`player::PlaybackEngine`] is the surface the autoplay router drives
//! - [`player::SongbirdPlayer`] implements it on top of a songbird `Call`
//! - Track end and error events from songbird close the current entry
//!
//! ### [`queue`] - Primary Queue
//! - User requests and fallback entries, tagged by origin
//! - Serializable snapshot for resume after restart
//!
//! ### [`events`] - Player Events
//! - `play`, `resume`, `pause`, `stop`, `finished-playing`, `entry-added`, `error`
//! - Delivered in emission order over an unbounded channel

pub mod events;
pub mod player;
pub mod queue;
