//! Lossy codec round-trips
//!
//! The pipeline treats the codec as a black box: encode, decode, return a
//! buffer of the input length at the input rate. Round-trips run on their
//! own thread so a hung encoder cannot stall a worker past the configured
//! timeout.

pub mod pcm;

#[cfg(feature = "opus")]
pub mod opus;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::config::CodecKind;
use crate::error::{Result, SynthesisError};
use crate::io::sample_buffer::SampleBuffer;

pub use pcm::Pcm16Codec;

#[cfg(feature = "opus")]
pub use self::opus::OpusCodec;

/// Encode-then-decode collaborator
pub trait Codec: Send + Sync {
    /// Name recorded in the parameter log
    fn name(&self) -> &str;

    /// Encode and decode `buffer`; the result has the same length and rate
    fn round_trip(&self, buffer: &SampleBuffer) -> Result<SampleBuffer>;
}

/// Built-in codec for `kind`
///
/// # Errors
///
/// `InvalidConfig` if `kind` is Opus and the crate was built without the
/// `opus` feature
pub fn codec_for(kind: CodecKind) -> Result<Arc<dyn Codec>> {
    match kind {
        CodecKind::Pcm16 => Ok(Arc::new(Pcm16Codec)),
        #[cfg(feature = "opus")]
        CodecKind::Opus => Ok(Arc::new(OpusCodec::default())),
        #[cfg(not(feature = "opus"))]
        CodecKind::Opus => Err(SynthesisError::InvalidConfig(
            "codec 'opus' requires the `opus` feature".to_string(),
        )),
    }
}

/// Run `codec.round_trip` on a dedicated thread, giving up after `timeout`
///
/// The worker thread is detached on timeout; its result is dropped.
///
/// # Errors
///
/// `CodecTimeout` if no result arrives in time, `Codec` if the worker
/// thread dies, otherwise whatever the codec returns
pub fn run_with_timeout(
    codec: Arc<dyn Codec>,
    buffer: &SampleBuffer,
    timeout: Duration,
) -> Result<SampleBuffer> {
    let (tx, rx) = bounded(1);
    let input = buffer.clone();
    let worker_codec = Arc::clone(&codec);

    thread::Builder::new()
        .name(format!("codec-{}", codec.name()))
        .spawn(move || {
            // Receiver may be gone after a timeout
            let _ = tx.send(worker_codec.round_trip(&input));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!(
                "Codec '{}' did not finish within {} ms",
                codec.name(),
                timeout.as_millis()
            );
            Err(SynthesisError::CodecTimeout {
                codec: codec.name().to_string(),
                timeout_ms: timeout.as_millis(),
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(SynthesisError::Codec(format!(
            "codec '{}' worker exited without a result",
            codec.name()
        ))),
    }
}
