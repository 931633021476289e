//! Session entry point: one context, many command fetches.

use crate::commands::{
    MandelbrotChannel, MandelbrotChannelQueryParams, Momentum, MomentumQueryParams,
};
use crate::envelope::Envelope;
use crate::error::{FetchError, ValidationError};
use crate::fetcher::{Command, Fetcher, FetcherConfig};
use crate::params::{ContextParams, RawParams};
use std::sync::Arc;

/// Holds the session context and hands out a fresh fetcher per call.
#[derive(Debug, Clone)]
pub struct Toolbox {
    context: Arc<ContextParams>,
    config: FetcherConfig,
}

impl Toolbox {
    pub fn new(context: ContextParams, config: FetcherConfig) -> Self {
        Self {
            context: Arc::new(context),
            config,
        }
    }

    pub fn from_raw(raw: &RawParams, config: FetcherConfig) -> Result<Self, ValidationError> {
        Ok(Self::new(ContextParams::from_raw(raw)?, config))
    }

    pub fn context(&self) -> &ContextParams {
        &self.context
    }

    pub fn technical(&self) -> Technical<'_> {
        Technical { toolbox: self }
    }

    fn run<C: Command>(&self, params: Option<RawParams>) -> Result<Envelope<C::Params>, FetchError> {
        Fetcher::<C>::new(Arc::clone(&self.context), params, self.config.clone()).fetch()
    }
}

/// Technical-analysis commands.
pub struct Technical<'a> {
    toolbox: &'a Toolbox,
}

impl Technical<'_> {
    pub fn mandelbrot_channel(
        &self,
        params: Option<RawParams>,
    ) -> Result<Envelope<MandelbrotChannelQueryParams>, FetchError> {
        self.toolbox.run::<MandelbrotChannel>(params)
    }

    pub fn momentum(
        &self,
        params: Option<RawParams>,
    ) -> Result<Envelope<MomentumQueryParams>, FetchError> {
        self.toolbox.run::<Momentum>(params)
    }
}
