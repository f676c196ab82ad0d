//! Docker Driver: a thin façade over Docker host operations.

mod driver;

pub use driver::DockerDriver;
