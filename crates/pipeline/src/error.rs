/// Chain construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Two stages share a name, so later stages could not address them.
    #[error("Chain '{chain}' has more than one stage named '{stage}'")]
    DuplicateStage { chain: String, stage: String },

    #[error("Chain '{0}' has no stages")]
    EmptyChain(String),

    #[error("Unknown pipeline preset '{0}' (expected 'video' or 'narrated-video')")]
    UnknownPreset(String),
}
