use thiserror::Error;

/// Fatal errors raised by the core simulation crates.
///
/// Per the simulator's error design, these three kinds are the only
/// conditions that abort a run; everything else (missing neighbour before
/// discovery, empty PDF, an unexpected payload shape) is logged and treated
/// as a zero-valued metric instead.
#[derive(Debug, Error)]
pub enum WsnError {
    #[error("topology error: {0}")]
    Topology(String),

    #[error("link delay sampler returned a negative value: {0}")]
    Sampler(f64),

    #[error("unknown routing protocol: {0}")]
    Config(String),
}

pub type WsnResult<T> = Result<T, WsnError>;
