pub mod conversation;
pub mod envelope;
pub mod item;
pub mod metric;
pub mod plan;
pub mod quality;
pub mod schema;
