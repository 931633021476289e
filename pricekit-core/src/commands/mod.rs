//! Fetchable commands.

pub mod mandelbrot;
pub mod momentum;

pub use mandelbrot::{MandelbrotChannel, MandelbrotChannelQueryParams};
pub use momentum::{Momentum, MomentumQueryParams};
