//! Artifact gathering.
//!
//! A [`Gatherer`] drives a page session through the configured passes and
//! returns the resulting [`Artifacts`]. The session type is chosen by the
//! gatherer; the pipeline only forwards it.

pub mod http;

use async_trait::async_trait;

use crate::artifacts::Artifacts;
use crate::config::{PassConfig, RunOptions};
use crate::error::GatherError;
use crate::target::TargetUrl;

pub use http::HttpGatherer;

/// Everything a gatherer gets to see about the run.
#[derive(Debug)]
pub struct GatherContext<'a, S> {
    /// Page-session handle supplied by the caller of the run.
    pub session: &'a S,
    pub url: &'a TargetUrl,
    pub options: &'a RunOptions,
}

#[async_trait]
pub trait Gatherer: Send + Sync {
    type Session: Send + Sync;

    async fn gather(
        &self,
        ctx: GatherContext<'_, Self::Session>,
        passes: &[PassConfig],
    ) -> Result<Artifacts, GatherError>;
}
