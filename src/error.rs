use thiserror::Error;

/// Crate-wide failure envelope. Every public operation returns either a
/// success payload or exactly one of these kinds; nothing panics across the
/// API boundary.
#[derive(Error, Debug)]
pub enum RoError {
    #[error("invalid water composition: {reason}")]
    InvalidComposition { reason: String },

    #[error("unknown membrane model '{model}'")]
    UnknownMembrane { model: String },

    #[error("no feasible configuration: {detail}")]
    NoFeasibleConfiguration { detail: String },

    #[error("chemistry engine failure: {detail}")]
    Chemistry { detail: String },

    #[error(
        "stage {stage}: computed feed pressure {computed_pa:.0} Pa exceeds membrane limit {limit_pa:.0} Pa"
    )]
    PressureLimitExceeded {
        stage: usize,
        computed_pa: f64,
        limit_pa: f64,
    },

    #[error("stage {stage}: operating point out of range: {detail}")]
    FluxOutOfRange { stage: usize, detail: String },

    #[error("{context} did not converge within {iterations} iterations")]
    ConvergenceFailure { context: String, iterations: usize },

    #[error("request deadline reached")]
    Cancelled,

    #[cfg(feature = "cli")]
    #[error("Error reading from stdin: {source}")]
    ReadStdin {
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "cli")]
    #[error("Error reading file '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "cli")]
    #[error("Invalid JSON request: {source}")]
    ParseRequestJson {
        #[source]
        source: serde_json::Error,
    },

    #[cfg(feature = "cli")]
    #[error("Could not serialize output to JSON: {source}")]
    SerializeOutput {
        #[source]
        source: serde_json::Error,
    },

    #[cfg(feature = "cli")]
    #[error("Missing input data: provide --input or --request-json")]
    MissingInputData,
}
