//! feedmux: merge many RSS v2 and Atom feeds into one timeline.
//!
//! A [`Client`] owns an ordered set of [`Source`]s. Each cycle fetches every
//! source concurrently under one deadline, normalizes both schemas into a
//! common [`Item`], and merges the results into a date-ordered [`Feed`].
//! Sources that time out, fail, or serve broken XML are left out and
//! reported as [`Diagnostic`]s; they never abort the cycle.
//!
//! ```no_run
//! use feedmux::{Client, Config, Source};
//!
//! # async fn run() -> Result<(), feedmux::FetchError> {
//! let mut client = Client::new(&Config::default())?;
//! client.add_sources([Source::guess("https://xkcd.com/atom.xml", "xkcd")]);
//!
//! for item in client.load_all().await {
//!     println!("{:?} {}", item.date, item.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod feed;
pub mod util;

pub use client::{Client, CycleState};
pub use config::{Config, ConfigError};
pub use feed::{
    aggregate, fetch, parse, Aggregation, Diagnostic, Feed, FetchError, FetchOutcome, Item,
    ParseError, Registry, Retrieve, SchemaKind, SortOrder, Source, SourceError, SourceKind,
    Transport,
};
