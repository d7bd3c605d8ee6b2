//! # Events Module
//!
//! Structured events emitted by an ingest run.
//!
//! ## Design
//! Workers emit one [`FileEvent`] per terminal outcome through an
//! [`EventSender`]. Sinks (the CLI, the session log, tests) subscribe by
//! holding the matching receiver. Aggregated [`ProgressUpdate`] snapshots
//! are published separately by the progress tracker.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::File(FileEvent::Duplicate { source, .. }) = event {
//!             println!("duplicate: {}", source.display());
//!         }
//!     }
//! });
//!
//! organizer.run_with_events(&sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
