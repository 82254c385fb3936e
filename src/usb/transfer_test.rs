use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use nix::errno::Errno;

use crate::usb::transfer::{
    Completion, TransferCanceller, TransferError, TransferPipeline, Transport,
};

/// Transport driven by a script of completions sent over a channel. The
/// canceller enqueues `Cancelled`, which wakes a blocked submission the
/// way a real cancel primitive would.
struct ScriptedTransport {
    rx: mpsc::Receiver<(Completion, Vec<u8>)>,
    tx: mpsc::Sender<(Completion, Vec<u8>)>,
    prepare_error: Option<io::Error>,
    drops: Arc<AtomicUsize>,
}

type Script = mpsc::Sender<(Completion, Vec<u8>)>;

impl ScriptedTransport {
    fn new() -> (Self, Script, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::channel();
        let drops = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            rx,
            tx: tx.clone(),
            prepare_error: None,
            drops: drops.clone(),
        };
        (transport, tx, drops)
    }

    fn with_prepare_error() -> (Self, Arc<AtomicUsize>) {
        let (mut transport, _script, drops) = Self::new();
        transport.prepare_error = Some(io::Error::from_raw_os_error(Errno::ENODEV as i32));
        (transport, drops)
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl Transport for ScriptedTransport {
    fn max_packet_size(&self) -> usize {
        16
    }

    fn prepare(&mut self) -> io::Result<()> {
        match self.prepare_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn canceller(&self) -> TransferCanceller {
        let tx = self.tx.clone();
        TransferCanceller::new(move || {
            let _ = tx.send((Completion::Cancelled, Vec::new()));
        })
    }

    fn submit(&mut self, buf: &mut [u8]) -> Completion {
        match self.rx.recv() {
            Ok((completion, data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                completion
            }
            Err(_) => Completion::Cancelled,
        }
    }
}

/// Counts handler invocations and records the payloads it saw.
fn recording_handler() -> (
    impl FnMut(&[u8]) + Send + 'static,
    Arc<AtomicUsize>,
    Arc<Mutex<Vec<Vec<u8>>>>,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let payloads: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let calls = calls.clone();
        let payloads = payloads.clone();
        move |buf: &[u8]| {
            calls.fetch_add(1, Ordering::SeqCst);
            payloads.lock().unwrap().push(buf.to_vec());
        }
    };
    (handler, calls, payloads)
}

async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test]
async fn test_stop_before_completion_frees_once() {
    let (transport, _script, drops) = ScriptedTransport::new();
    let (handler, calls, _payloads) = recording_handler();

    let mut pipeline = TransferPipeline::start(transport, handler).unwrap();
    pipeline.stop().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(!pipeline.is_running());

    // stop() is idempotent; nothing is freed twice
    pipeline.stop().await;
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_payload_reaches_handler_and_resubmits() {
    let (transport, script, drops) = ScriptedTransport::new();
    let (handler, calls, payloads) = recording_handler();

    let mut pipeline = TransferPipeline::start(transport, handler).unwrap();
    script
        .send((Completion::Read(4), vec![1, 2, 3, 4]))
        .unwrap();
    script.send((Completion::Read(2), vec![9, 9])).unwrap();

    wait_for(|| calls.load(Ordering::SeqCst) == 2).await;
    pipeline.stop().await;

    let seen = payloads.lock().unwrap().clone();
    assert_eq!(seen, vec![vec![1, 2, 3, 4], vec![9, 9]]);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unexpected_error_resubmits() {
    let (transport, script, _drops) = ScriptedTransport::new();
    let (handler, calls, payloads) = recording_handler();

    let mut pipeline = TransferPipeline::start(transport, handler).unwrap();
    script
        .send((Completion::Failed(Errno::EPIPE), Vec::new()))
        .unwrap();
    script.send((Completion::Read(1), vec![7])).unwrap();

    // The failed transfer is resubmitted and the next payload arrives
    wait_for(|| calls.load(Ordering::SeqCst) == 1).await;
    pipeline.stop().await;

    assert_eq!(payloads.lock().unwrap().clone(), vec![vec![7]]);
}

#[tokio::test]
async fn test_shutdown_class_error_stops_pipeline() {
    let (transport, script, drops) = ScriptedTransport::new();
    let (handler, calls, _payloads) = recording_handler();

    let pipeline = TransferPipeline::start(transport, handler).unwrap();
    script
        .send((Completion::Failed(Errno::ENODEV), Vec::new()))
        .unwrap();

    pipeline.stopped().await;
    assert!(!pipeline.is_running());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_length_completion_skips_handler() {
    let (transport, script, _drops) = ScriptedTransport::new();
    let (handler, calls, payloads) = recording_handler();

    let mut pipeline = TransferPipeline::start(transport, handler).unwrap();
    script.send((Completion::Read(0), Vec::new())).unwrap();
    script.send((Completion::Read(3), vec![1, 2, 3])).unwrap();

    wait_for(|| calls.load(Ordering::SeqCst) == 1).await;
    pipeline.stop().await;

    assert_eq!(payloads.lock().unwrap().clone(), vec![vec![1, 2, 3]]);
}

#[tokio::test]
async fn test_rejected_initial_submission() {
    let (transport, drops) = ScriptedTransport::with_prepare_error();
    let (handler, calls, _payloads) = recording_handler();

    let result = TransferPipeline::start(transport, handler);
    assert!(matches!(result, Err(TransferError::Submission(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    // The transport never made it into a worker and is freed exactly once
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_races_completion_cleanly() {
    let (transport, script, drops) = ScriptedTransport::new();
    let (handler, calls, _payloads) = recording_handler();

    let mut pipeline = TransferPipeline::start(transport, handler).unwrap();
    // A completion lands while the control path is tearing down
    script.send((Completion::Read(2), vec![5, 5])).unwrap();
    pipeline.stop().await;

    // No callback fires after stop() returns and nothing is freed twice
    let settled = calls.load(Ordering::SeqCst);
    assert!(settled <= 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), settled);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
