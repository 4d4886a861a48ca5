mod client;
mod view;

pub use client::QueryClient;
pub use view::{QueryState, SearchQuery, ViewQuery};
