pub mod engine;

pub use engine::{
    CancellationEngine, CancellationError, SeriesCancellation, SessionCancellation,
    TierCancellation,
};
