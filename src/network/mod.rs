//! Network side of the cache: the real HTTP fetcher.

mod client;

pub use client::HttpFetcher;
