use crate::wrapper::{BlockWrapper, HeaderWrapper};

/// Downcalls the pipeline makes into the embedding application. All four
/// are invoked from worker/completion-callback context, never from the
/// caller of [`crate::pipeline::Pipeline::start`] — an embedder whose
/// importer is slow must hand off internally rather than block here.
pub trait PipelineSinks: Send + Sync {
    /// Called with the contiguous prefix each time the header queue
    /// extends. Emits heights in strictly ascending order, each exactly
    /// once, for the lifetime of the pipeline.
    fn push_headers(&self, headers: Vec<HeaderWrapper>);

    /// As above for bodies, once a block's header is already known.
    fn push_blocks(&self, blocks: Vec<BlockWrapper>);

    /// Current admissible in-flight body count. The pipeline treats this
    /// as advisory truth and never calls it more than once per body-loop
    /// iteration.
    fn block_queue_free_size(&self) -> u64;

    /// Idempotent terminal hook, called once both enabled loops have
    /// finished (or immediately by the header loop in headers-only mode).
    fn finish_download(&self);
}
