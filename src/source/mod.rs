//! Source fetching for transform inputs and downloads

pub mod resolver;

pub use resolver::{FetchedSource, SourceFetcher};
