//! Per-shot processing engine: extraction, encoding, assembly and job bookkeeping

pub mod assembler;
pub mod cancel;
pub mod encoder;
pub mod extractor;
pub mod progress;

pub use assembler::StreamAssembler;
pub use cancel::CancellationToken;
pub use encoder::{EncodedClip, ShotEncoder};
pub use extractor::{ExtractedClip, SeekExtractor};
pub use progress::{JobTable, ProgressCounts};
