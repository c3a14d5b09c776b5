//! # MCP Scout
//!
//! A discovery index for Model Context Protocol servers.
//!
//! Scout aggregates public MCP server listings into one deduplicated
//! catalog and answers free-text capability queries ("I need a server that
//! can query Postgres") with the best-matching server, using vector
//! similarity when a local embedding model is available and a deterministic
//! lexical scorer otherwise.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌────────────┐   ┌───────────────┐
//! │ Sources        │──▶│ Aggregate  │──▶│ Catalog +      │
//! │ 3 listings     │   │ dedup/merge│   │ embeddings     │
//! └───────────────┘   └────────────┘   └──────┬────────┘
//!         ▲                                   │
//!  precomputed bundle / disk cache            │
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌──────────┐       ┌──────────┐
//!                    │   CLI    │       │   HTTP   │
//!                    │ (scout)  │       │  server  │
//!                    └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scout search "weather forecasts"   # one-off query
//! scout info                         # catalog and cache status
//! scout refresh                      # force a live aggregation cycle
//! scout serve                        # start the HTTP query server
//! scout build-data ./dist            # build a publishable data bundle
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`sources`] | Upstream listing fetchers and markdown parsers |
//! | [`aggregate`] | URL-keyed deduplication and merging |
//! | [`schema`] | Catalog schema versioning and compatibility |
//! | [`cache`] | On-disk catalog and embedding-matrix cache |
//! | [`precomputed`] | Publisher-built data bundle download |
//! | [`embedder`] | Embedding model abstraction and matrix codec |
//! | [`search`] | Semantic and lexical ranking |
//! | [`database`] | Tiered catalog assembly and ownership |
//! | [`docs`] | README retrieval for resolved entries |
//! | [`server`] | HTTP query server |
//! | [`build_data`] | Publisher-side bundle builder |

pub mod aggregate;
pub mod build_data;
pub mod cache;
pub mod config;
pub mod database;
pub mod docs;
pub mod embedder;
pub mod models;
pub mod precomputed;
pub mod schema;
pub mod search;
pub mod server;
pub mod sources;
