//! monday.com GraphQL client implementing the core `DataSource` port.
//!
//! Every call is a fresh request: board metadata through `boards(ids:)`, items through
//! `items_page` followed by `next_items_page` until the cursor runs out.

pub mod client;
pub mod queries;
pub mod types;

pub use client::MondayClient;
