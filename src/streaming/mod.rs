//! Streaming output-processing pipeline
//!
//! Turns the stdout of a long-running engine process into decorated, filtered
//! or re-encoded records while the process is still running. Lines are
//! reassembled from arbitrary chunks, run through a transformer chain (or
//! decoded as JSONL events), and handed to a write stage through a bounded
//! queue that both stages watch together with a cancellation token.

pub mod assembler;
pub mod backpressure;
pub mod jsonl;
pub mod processor;
pub mod runner;
pub mod transformer;
pub mod types;


pub use assembler::LineAssembler;
pub use backpressure::{bounded, QueueClosed, RecordReceiver, RecordSender};
pub use jsonl::{canonical_json, JsonLinesDecoder, JsonlRecord};
pub use processor::{processor_for, BoxedSource, JsonLinesProcessor, LineProcessor, StreamProcessor};
pub use runner::StreamPipeline;
pub use transformer::{
    Append, Clock, FixedClock, IgnoreMessage, LogFormat, Prepend, SystemClock, Transform,
    TransformerChain, TransformerChainBuilder, DEFAULT_LOG_FORMAT_LAYOUT,
};
pub use types::{
    OutputMode, PipelineConfig, ProduceSummary, RunOutcome, RunReport, RunState,
    DEFAULT_QUEUE_CAPACITY,
};
