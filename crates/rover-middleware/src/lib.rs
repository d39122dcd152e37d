//! `rover-middleware` – fan-out between one producer and many viewers.
//!
//! # Modules
//!
//! - [`broadcast`] – latest-value [`Broadcaster`] built on
//!   [`tokio::sync::watch`].  One instance carries video frames, another
//!   carries sensor samples.

pub mod broadcast;

pub use broadcast::{Broadcaster, Subscription};
