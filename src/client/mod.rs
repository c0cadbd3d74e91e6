//! The `client` module holds the caller-facing side of the broker.
//!
//! It provides the `Publisher` facade, which forwards publishes to a
//! broker shared behind `Arc<Mutex<_>>`.

pub mod publisher;
pub use publisher::Publisher;

#[cfg(test)]
mod tests;
