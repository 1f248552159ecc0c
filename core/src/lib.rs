//! Client core for the activities dashboard.
//!
//! # Overview
//! Turns a paginated, filterable REST collection into a local, mutable,
//! observable view. Requests are built and responses parsed without touching
//! the network (host-does-IO); the host executes the round-trip directly or
//! through a `Transport`.
//!
//! # Design
//! - `CollectionEndpoint` is stateless: config in, `HttpRequest` out,
//!   `HttpResponse` in, typed `Page` or record out.
//! - `RemoteCollection` owns pagination state, the current filter and the
//!   overlay of local mutations. Writes follow write, mutate, refresh.
//! - `Dashboard` owns selection and swaps in a new item collection, with a
//!   new generation, whenever the selected activity changes.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod provider;
pub mod selection;
pub mod transport;
pub mod types;

pub use config::{CollectionConfig, ConfigError, DashboardConfig};
pub use endpoint::CollectionEndpoint;
pub use error::{ApiError, MutationError, WriteOperation};
pub use crate::http::{HttpMethod, HttpRequest, HttpResponse};
pub use provider::{CollectionStatus, Mutation, PendingFetch, RemoteCollection};
pub use selection::{chart_series, ChartSeries, Dashboard, DeleteOutcome, Prompt};
pub use transport::Transport;
pub use types::{Activity, FetchRequest, Item, ItemDraft, ItemMetadata, ItemUpdate, NewItem, Page, Record};
