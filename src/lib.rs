//! Upstream channel health probing.
//!
//! Checks which models an OpenAI-compatible upstream exposes under each of
//! a channel's API keys, folds the per-key results into one summary, and
//! writes the channel's status back to SQLite.

pub mod adapters;
pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod store;
pub mod util;

pub use adapters::{ModelProbe, OpenAIModelsProbe, ProbeResult};
pub use discovery::{test_channel_tokens, ChannelTester, Credential, TestSummary, TokenTestItem};
pub use error::ProbeError;
pub use store::{ChannelStore, ChannelTestUpdate};
