use std::collections::TryReserveError;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::endpoint::InterruptEndpoint;

const READ_TOKEN: Token = Token(0);
const WAKE_TOKEN: Token = Token(1);

/// Outcome of one submitted interrupt transfer.
#[derive(Debug)]
pub enum Completion {
    /// The transfer completed with a payload of the given length.
    Read(usize),
    /// The transfer was cancelled from the control path.
    Cancelled,
    /// The transfer completed with a nonzero status.
    Failed(Errno),
}

/// Errors starting the transfer pipeline.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("failed to allocate transfer buffer: {0}")]
    Allocation(#[from] TryReserveError),
    #[error("initial transfer submission rejected: {0}")]
    Submission(io::Error),
}

/// Cancels an in-flight transfer from the control path.
///
/// A cancel must wake the current submission and any later one, so
/// cancelling between two submissions cannot be lost.
#[derive(Clone)]
pub struct TransferCanceller {
    cancel: Arc<dyn Fn() + Send + Sync>,
}

impl TransferCanceller {
    pub fn new<F>(cancel: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            cancel: Arc::new(cancel),
        }
    }

    pub fn cancel(&self) {
        (self.cancel)()
    }
}

/// One inbound interrupt transfer endpoint.
///
/// `submit` blocks until the transfer completes or is cancelled through
/// the [TransferCanceller]; the pipeline relies on that wake-up for
/// race-free teardown.
pub trait Transport: Send + 'static {
    /// Size of the receive buffer one transfer needs.
    fn max_packet_size(&self) -> usize;

    /// Register the transfer with the host I/O layer. Called once before
    /// the first submission; failure rejects pipeline start-up.
    fn prepare(&mut self) -> io::Result<()>;

    /// Handle for cancelling submissions from another thread.
    fn canceller(&self) -> TransferCanceller;

    /// Submit one transfer into `buf` and wait for its completion.
    fn submit(&mut self, buf: &mut [u8]) -> Completion;
}

/// Lifecycle of the one in-flight transfer.
#[derive(Debug)]
enum TransferState {
    Submitted,
    Completed(Completion),
    Stopped,
}

/// Asynchronous inbound transfer pipeline.
///
/// Owns one transfer at a time: submit, classify the completion, hand
/// the payload to the report handler under a short-held lock, resubmit.
/// The worker owns the receive buffer and the transport, so both are
/// freed exactly once no matter how teardown races a completion.
pub struct TransferPipeline {
    running: Arc<AtomicBool>,
    stopped: Arc<Notify>,
    canceller: TransferCanceller,
    worker: Option<JoinHandle<()>>,
}

impl TransferPipeline {
    /// Allocate the receive buffer, register the transfer and start the
    /// submission loop. `on_report` runs once per non-empty payload.
    pub fn start<T, F>(mut transport: T, on_report: F) -> Result<Self, TransferError>
    where
        T: Transport,
        F: FnMut(&[u8]) + Send + 'static,
    {
        let size = transport.max_packet_size();
        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(size)?;
        buf.resize(size, 0);

        transport.prepare().map_err(TransferError::Submission)?;

        let running = Arc::new(AtomicBool::new(true));
        let stopped = Arc::new(Notify::new());
        let canceller = transport.canceller();
        // Serializes buffer interpretation against concurrent readers
        let handler = Arc::new(Mutex::new(on_report));

        let worker = tokio::task::spawn_blocking({
            let running = running.clone();
            let stopped = stopped.clone();
            move || {
                run_transfers(transport, buf, handler, &running);
                running.store(false, Ordering::SeqCst);
                stopped.notify_one();
                // Transport and buffer are dropped here, exactly once
            }
        });

        Ok(Self {
            running,
            stopped,
            canceller,
            worker: Some(worker),
        })
    }

    /// True while the submission loop is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolves when the submission loop has terminated on its own.
    pub async fn stopped(&self) {
        self.stopped.notified().await
    }

    /// Stop the pipeline: clear the running flag, cancel the in-flight
    /// transfer and wait for the worker to quiesce. Idempotent.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.canceller.cancel();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

fn run_transfers<T, F>(
    mut transport: T,
    mut buf: Vec<u8>,
    handler: Arc<Mutex<F>>,
    running: &AtomicBool,
) where
    T: Transport,
    F: FnMut(&[u8]) + Send,
{
    let mut state = TransferState::Submitted;
    loop {
        state = match state {
            TransferState::Submitted => {
                if running.load(Ordering::SeqCst) {
                    TransferState::Completed(transport.submit(&mut buf))
                } else {
                    TransferState::Stopped
                }
            }
            TransferState::Completed(completion) => match completion {
                Completion::Cancelled => {
                    log::debug!("interrupt transfer cancelled");
                    TransferState::Stopped
                }
                Completion::Failed(errno) if is_shutdown_class(errno) => {
                    log::debug!("interrupt endpoint shut down ({errno}), not resubmitting");
                    TransferState::Stopped
                }
                Completion::Failed(errno) => {
                    // Maybe we can recover
                    log::warn!("interrupt transfer failed ({errno}), resubmitting");
                    TransferState::Submitted
                }
                Completion::Read(0) => TransferState::Submitted,
                Completion::Read(len) => {
                    let len = len.min(buf.len());
                    if let Ok(mut on_report) = handler.lock() {
                        on_report(&buf[..len]);
                    }
                    TransferState::Submitted
                }
            },
            TransferState::Stopped => break,
        };
    }
}

/// Completion statuses that signal intentional teardown or a vanished
/// device; resubmitting after these is never useful.
fn is_shutdown_class(errno: Errno) -> bool {
    matches!(
        errno,
        Errno::ENOENT | Errno::ECONNRESET | Errno::ESHUTDOWN | Errno::ENODEV
    )
}

/// Interrupt transport backed by the device's hidraw node.
///
/// Reads are non-blocking; a submission waits on a poller that the
/// canceller can wake from another thread.
pub struct HidrawTransport {
    file: File,
    endpoint: InterruptEndpoint,
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
}

impl HidrawTransport {
    pub fn open(devnode: &str, endpoint: InterruptEndpoint) -> io::Result<Self> {
        let file = File::open(devnode)?;
        let raw_fd = file.as_raw_fd();
        nix::fcntl::fcntl(raw_fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))?;

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        log::debug!(
            "opened {devnode} (endpoint 0x{:02x}, max packet {}, interval {})",
            endpoint.address,
            endpoint.max_packet_size,
            endpoint.interval
        );

        Ok(Self {
            file,
            endpoint,
            poll,
            events: Events::with_capacity(4),
            waker,
        })
    }
}

impl Transport for HidrawTransport {
    fn max_packet_size(&self) -> usize {
        self.endpoint.max_packet_size as usize
    }

    fn prepare(&mut self) -> io::Result<()> {
        self.poll.registry().register(
            &mut SourceFd(&self.file.as_raw_fd()),
            READ_TOKEN,
            Interest::READABLE,
        )
    }

    fn canceller(&self) -> TransferCanceller {
        let waker = self.waker.clone();
        TransferCanceller::new(move || {
            if let Err(e) = waker.wake() {
                log::warn!("failed to wake transfer poller: {e}");
            }
        })
    }

    fn submit(&mut self, buf: &mut [u8]) -> Completion {
        loop {
            // The fd is non-blocking; drain it before waiting so a report
            // queued between submissions is not missed by the poller.
            match (&self.file).read(buf) {
                Ok(len) => return Completion::Read(len),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => (),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    let errno = err
                        .raw_os_error()
                        .map(Errno::from_raw)
                        .unwrap_or(Errno::EIO);
                    return Completion::Failed(errno);
                }
            }

            match self.poll.poll(&mut self.events, None) {
                Ok(()) => (),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Completion::Failed(Errno::EIO),
            }
            for event in self.events.iter() {
                if event.token() == WAKE_TOKEN {
                    return Completion::Cancelled;
                }
            }
        }
    }
}
