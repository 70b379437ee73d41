//! Realtime duplex stream driver.
//!
//! Uses a dedicated std::thread (NOT a tokio task) so the block loop never
//! competes with async work. Each iteration reads one input block, runs the
//! processing core and writes exactly one output block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use tokio::sync::mpsc;

use super::{AudioBlock, BLOCK_SIZE};
use crate::error::PrismError;
use crate::processing::ProcessingCore;

/// Block-granular access to the capture/playback pair.
///
/// Implementations handle recoverable glitches (XRUNs) internally; an `Err`
/// means the stream cannot continue.
pub trait DuplexIo {
    fn read_block(&mut self, block: &mut AudioBlock) -> Result<(), PrismError>;
    fn write_block(&mut self, block: &AudioBlock) -> Result<(), PrismError>;
}

/// Terminal notifications from the audio thread.
#[derive(Debug)]
pub enum DriverEvent {
    Stopped { blocks: u64 },
    Failed(PrismError),
}

pub struct AudioStreamDriver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioStreamDriver {
    /// Start the audio thread.
    ///
    /// * `open`   - Opens the device pair; runs on the audio thread
    /// * `core`   - Processing core, moved into the audio thread
    /// * `events` - Receives exactly one terminal `DriverEvent`
    pub fn start<F, IO>(open: F, core: ProcessingCore, events: mpsc::Sender<DriverEvent>) -> Result<Self>
    where
        F: FnOnce() -> Result<IO> + Send + 'static,
        IO: DuplexIo,
    {
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let running = running.clone();
            thread::Builder::new()
                .name("prism-audio".into())
                .spawn(move || {
                    let result = match open() {
                        Ok(io) => run_blocks(io, core, &running),
                        Err(e) => Err(PrismError::Stream(format!("{:#}", e))),
                    };
                    let event = match result {
                        Ok(blocks) => {
                            log::info!("Audio stream stopped after {} blocks", blocks);
                            DriverEvent::Stopped { blocks }
                        }
                        Err(e) => {
                            log::error!("Audio stream failed: {}", e);
                            running.store(false, Ordering::SeqCst);
                            DriverEvent::Failed(e)
                        }
                    };
                    if events.blocking_send(event).is_err() {
                        log::warn!("Driver event dropped, receiver gone");
                    }
                })?
        };

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the audio thread to stop and wait for it to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for AudioStreamDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_blocks<IO: DuplexIo>(
    mut io: IO,
    mut core: ProcessingCore,
    running: &AtomicBool,
) -> Result<u64, PrismError> {
    let channels = core.channels();
    let mut input = AudioBlock::silent(BLOCK_SIZE, channels.input_channels);
    let mut output = AudioBlock::silent(BLOCK_SIZE, channels.output_channels);

    // One period of silence so the first processed block does not underrun
    io.write_block(&output)?;

    log::info!(
        "Audio stream running: block={} frames, {} in / {} out",
        BLOCK_SIZE,
        channels.input_channels,
        channels.output_channels
    );

    let mut blocks = 0u64;
    while running.load(Ordering::Relaxed) {
        io.read_block(&mut input)?;
        core.process_block(&input, &mut output);
        io.write_block(&output)?;
        blocks += 1;
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ChannelConfig;
    use crate::hazard::HazardEffect;
    use crate::panic_monitor::PanicSource;
    use crate::stems::StemBackend;
    use std::sync::Mutex;
    use std::time::Duration;

    struct NeverPanic;

    impl PanicSource for NeverPanic {
        fn is_panic(&mut self) -> bool {
            false
        }
    }

    struct AlwaysPanic;

    impl PanicSource for AlwaysPanic {
        fn is_panic(&mut self) -> bool {
            true
        }
    }

    /// Produces a ramp for `blocks` reads, then reports a disconnect.
    /// `blocks = None` streams forever.
    struct FakeDuplex {
        blocks: Option<usize>,
        reads: usize,
        written: Arc<Mutex<Vec<AudioBlock>>>,
    }

    impl DuplexIo for FakeDuplex {
        fn read_block(&mut self, block: &mut AudioBlock) -> Result<(), PrismError> {
            if self.blocks.is_some_and(|n| self.reads >= n) {
                return Err(PrismError::Stream("device disconnected".into()));
            }
            self.reads += 1;
            for (n, s) in block.as_mut_slice().iter_mut().enumerate() {
                *s = (n as f32 * 0.01).sin() * 0.5;
            }
            thread::sleep(Duration::from_millis(1));
            Ok(())
        }

        fn write_block(&mut self, block: &AudioBlock) -> Result<(), PrismError> {
            self.written.lock().unwrap().push(block.clone());
            Ok(())
        }
    }

    fn build_core(panic: Box<dyn PanicSource>, outputs: usize) -> ProcessingCore {
        ProcessingCore::new(
            panic,
            HazardEffect::new(44_100),
            StemBackend::Unavailable("test".into()),
            ChannelConfig::with_outputs(outputs),
        )
    }

    #[test]
    fn disconnect_is_fatal_and_every_block_is_written() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let io = FakeDuplex {
            blocks: Some(5),
            reads: 0,
            written: written.clone(),
        };
        let (tx, mut rx) = mpsc::channel(4);
        let mut driver =
            AudioStreamDriver::start(move || Ok(io), build_core(Box::new(AlwaysPanic), 4), tx).expect("start");

        match rx.blocking_recv() {
            Some(DriverEvent::Failed(PrismError::Stream(msg))) => assert!(msg.contains("disconnected")),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!driver.is_running());
        driver.stop();

        let written = written.lock().unwrap();
        // prefill + one per block read
        assert_eq!(written.len(), 6);
        for block in written.iter() {
            assert_eq!(block.frames(), BLOCK_SIZE);
            assert_eq!(block.channels(), 4);
            assert!(block.as_slice().iter().all(|s| (-1.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn stop_ends_the_stream_cleanly() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let io = FakeDuplex {
            blocks: None,
            reads: 0,
            written: written.clone(),
        };
        let (tx, mut rx) = mpsc::channel(4);
        let mut driver =
            AudioStreamDriver::start(move || Ok(io), build_core(Box::new(NeverPanic), 2), tx).expect("start");

        thread::sleep(Duration::from_millis(30));
        driver.stop();

        match rx.blocking_recv() {
            Some(DriverEvent::Stopped { blocks }) => {
                assert_eq!(written.lock().unwrap().len() as u64, blocks + 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn open_failure_is_reported() {
        let (tx, mut rx) = mpsc::channel(1);
        let _driver = AudioStreamDriver::start(
            || -> Result<FakeDuplex> { anyhow::bail!("no such device 'hw:9'") },
            build_core(Box::new(NeverPanic), 2),
            tx,
        )
        .expect("start");

        match rx.blocking_recv() {
            Some(DriverEvent::Failed(PrismError::Stream(msg))) => assert!(msg.contains("hw:9")),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
