//! Gateway implementation

mod builder;
mod route;
pub mod selector;
pub mod single_flight;

pub use builder::{Heimdall, HeimdallBuilder};
pub use route::Gateway;
pub use single_flight::SingleFlight;
