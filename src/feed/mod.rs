//! Feed aggregation pipeline for RSS v2 and Atom sources.
//!
//! - **Sources**: the keyed, ordered set of feed locations
//! - **Fetching**: concurrent retrieval under one shared deadline
//! - **Parsing**: both schemas normalized into one [`Item`] shape
//! - **Aggregation**: merge, attach provenance, deterministic sort
//!
//! # Architecture
//!
//! ```text
//! Registry ──► fetch() ──► parse() per payload ──► aggregate() ──► Feed
//!             (parallel)     (pure)                 (merge + sort)
//! ```
//!
//! - [`source`] - [`Source`] records and the [`Registry`]
//! - [`fetcher`] - the [`Retrieve`] capability, [`Transport`], and [`fetch`]
//! - [`parser`] - RSS v2 / Atom normalization and date handling
//! - [`aggregator`] - merge of one cycle's outcomes into a [`Feed`]
//!
//! # Example
//!
//! ```ignore
//! let outcomes = fetch(retriever, &sources, Duration::from_secs(3)).await;
//! let result = aggregate(sources.into_iter().zip(outcomes), SortOrder::Descending);
//! for item in &result.feed {
//!     println!("{}", item.title);
//! }
//! ```

pub mod aggregator;
pub mod fetcher;
pub mod item;
pub mod parser;
pub mod source;

pub use aggregator::{aggregate, Aggregation, Diagnostic, SourceError};
pub use fetcher::{fetch, FetchError, FetchOutcome, Retrieve, Transport, MAX_FEED_SIZE};
pub use item::{Feed, Item, SchemaKind, SortOrder};
pub use parser::{parse, ParseError, Parsed};
pub use source::{Registry, Source, SourceKind};
