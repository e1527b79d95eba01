//! Background execution context for segmentation.
//!
//! A [`SegmentWorker`] owns one OS thread that processes jobs one at a time.
//! Each job carries a full snapshot of the page and request, so nothing is
//! shared with the caller while it runs. A panicking job is reported back as
//! [`SegmentError::Worker`] and the thread keeps serving.

mod scheduler;

pub use scheduler::{PublishedResult, SegmentScheduler};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use image::RgbaImage;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::segment::{self, SegmentError, SegmentationOutput, SegmentationRequest};

type JobResult = Result<SegmentationOutput, SegmentError>;

/// What the worker thread runs for each job.
type SegmentFn = fn(&RgbaImage, &SegmentationRequest, u32) -> JobResult;

struct Job {
    page: Arc<RgbaImage>,
    request: SegmentationRequest,
    reply: oneshot::Sender<JobResult>,
}

pub struct SegmentWorker {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    downscale_width: u32,
}

impl SegmentWorker {
    /// Starts the worker thread. Pages wider than `downscale_width` are
    /// detected on a downscaled copy.
    pub fn spawn(downscale_width: u32) -> Result<Self> {
        Self::spawn_with(downscale_width, segment::segment_scaled)
    }

    fn spawn_with(downscale_width: u32, segment_fn: SegmentFn) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("segment-worker".to_string())
            .spawn(move || worker_loop(receiver, downscale_width, segment_fn))
            .with_context(|| "failed to start segmentation worker thread")?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            downscale_width,
        })
    }

    pub fn downscale_width(&self) -> u32 {
        self.downscale_width
    }

    /// Queues a job and returns the channel its result will arrive on.
    ///
    /// Fails with [`SegmentError::EngineNotReady`] once the worker has been
    /// shut down.
    pub fn submit(
        &self,
        page: Arc<RgbaImage>,
        request: SegmentationRequest,
    ) -> Result<oneshot::Receiver<JobResult>, SegmentError> {
        let (reply, receiver) = oneshot::channel();
        let guard = self
            .sender
            .lock()
            .map_err(|_| SegmentError::EngineNotReady)?;
        let sender = guard.as_ref().ok_or(SegmentError::EngineNotReady)?;
        sender
            .send(Job {
                page,
                request,
                reply,
            })
            .map_err(|_| SegmentError::EngineNotReady)?;
        Ok(receiver)
    }

    pub async fn run(
        &self,
        page: Arc<RgbaImage>,
        request: SegmentationRequest,
    ) -> Result<SegmentationOutput, SegmentError> {
        let receiver = self.submit(page, request)?;
        receiver.await.map_err(|_| SegmentError::EngineNotReady)?
    }

    /// Blocking variant of [`run`](Self::run) for callers outside a runtime.
    pub fn run_blocking(
        &self,
        page: Arc<RgbaImage>,
        request: SegmentationRequest,
    ) -> Result<SegmentationOutput, SegmentError> {
        let receiver = self.submit(page, request)?;
        receiver
            .blocking_recv()
            .map_err(|_| SegmentError::EngineNotReady)?
    }

    /// Stops accepting jobs, lets queued ones finish, and joins the thread.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handle = self.handle.lock().ok().and_then(|mut handle| handle.take());
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("segmentation worker thread exited abnormally");
        }
    }
}

impl Drop for SegmentWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: mpsc::Receiver<Job>, downscale_width: u32, segment_fn: SegmentFn) {
    while let Ok(job) = receiver.recv() {
        debug!(
            "worker: job for {} ({}x{})",
            job.request.page_id,
            job.page.width(),
            job.page.height()
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            segment_fn(&job.page, &job.request, downscale_width)
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            warn!("worker: job for {} panicked: {}", job.request.page_id, message);
            Err(SegmentError::Worker(message))
        });
        if job.reply.send(outcome).is_err() {
            debug!("worker: caller went away before the result was ready");
        }
    }
    debug!("worker: channel closed, exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
