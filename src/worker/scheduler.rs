use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use image::RgbaImage;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;

use super::SegmentWorker;
use crate::segment::{SegmentError, SegmentationOutput, SegmentationRequest};

/// Latest finished segmentation for a page.
#[derive(Debug, Clone)]
pub struct PublishedResult {
    pub generation: u64,
    pub outcome: Result<Arc<SegmentationOutput>, Arc<SegmentError>>,
}

/// Debounces segmentation triggers for a single page.
///
/// Every trigger supersedes the previous one by bumping a generation
/// counter. A trigger only reaches the worker if no newer trigger arrived
/// during the debounce window, and its result is only published if it is
/// still the newest. Nothing is cancelled explicitly.
#[derive(Clone)]
pub struct SegmentScheduler {
    worker: Arc<SegmentWorker>,
    debounce: Duration,
    generation: Arc<AtomicU64>,
    published: Arc<watch::Sender<Option<PublishedResult>>>,
}

impl SegmentScheduler {
    pub fn new(worker: Arc<SegmentWorker>, debounce: Duration) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            worker,
            debounce,
            generation: Arc::new(AtomicU64::new(0)),
            published: Arc::new(published),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PublishedResult>> {
        self.published.subscribe()
    }

    pub fn latest(&self) -> Option<PublishedResult> {
        self.published.borrow().clone()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Schedules a segmentation of `page` and returns its generation.
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, page: Arc<RgbaImage>, request: SegmentationRequest) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let scheduler = self.clone();
        tokio::spawn(async move {
            if !scheduler.debounce.is_zero() {
                sleep(scheduler.debounce).await;
            }
            if scheduler.is_stale(generation) {
                debug!("scheduler: generation {} superseded before start", generation);
                return;
            }
            let outcome = scheduler
                .worker
                .run(page, request)
                .await
                .map(Arc::new)
                .map_err(Arc::new);
            if scheduler.is_stale(generation) {
                debug!("scheduler: generation {} superseded while running", generation);
                return;
            }
            scheduler.publish(PublishedResult {
                generation,
                outcome,
            });
        });
        generation
    }

    /// Waits for a published result at least as new as `generation`. A
    /// superseded trigger resolves with the result that replaced it.
    pub async fn wait_for(&self, generation: u64) -> Option<PublishedResult> {
        let mut updates = self.subscribe();
        let latest = match updates
            .wait_for(|published| {
                published
                    .as_ref()
                    .is_some_and(|result| result.generation >= generation)
            })
            .await
        {
            Ok(published) => (*published).clone(),
            Err(_) => None,
        };
        latest
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn publish(&self, result: PublishedResult) {
        self.published.send_if_modified(|current| {
            let newer = current
                .as_ref()
                .is_none_or(|existing| existing.generation < result.generation);
            if newer {
                *current = Some(result);
            }
            newer
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn page(blocks: u32) -> Arc<RgbaImage> {
        let mut page = RgbaImage::from_pixel(300, 200, Rgba([255, 255, 255, 255]));
        for i in 0..blocks {
            let y0 = 20 + i * 50;
            for y in y0..y0 + 15 {
                for x in 20..120 {
                    page.put_pixel(x, y, Rgba([0, 0, 0, 255]));
                }
            }
        }
        Arc::new(page)
    }

    #[tokio::test]
    async fn rapid_triggers_publish_only_the_last() {
        let worker = Arc::new(SegmentWorker::spawn(1500).unwrap());
        let scheduler = SegmentScheduler::new(worker, Duration::from_millis(40));
        let mut updates = scheduler.subscribe();

        scheduler.trigger(page(1), SegmentationRequest::default());
        scheduler.trigger(page(2), SegmentationRequest::default());
        let last = scheduler.trigger(page(3), SegmentationRequest::default());

        updates.changed().await.unwrap();
        let published = updates.borrow().clone().unwrap();
        assert_eq!(published.generation, last);
        assert_eq!(published.outcome.unwrap().regions.len(), 3);
        assert_eq!(scheduler.current_generation(), last);
    }

    #[tokio::test]
    async fn superseded_triggers_resolve_with_the_newer_result() {
        let worker = Arc::new(SegmentWorker::spawn(1500).unwrap());
        let scheduler = SegmentScheduler::new(worker, Duration::from_millis(40));

        let first = scheduler.trigger(page(1), SegmentationRequest::default());
        let second = scheduler.trigger(page(2), SegmentationRequest::default());
        let (early, late) = tokio::join!(scheduler.wait_for(first), scheduler.wait_for(second));

        let early = early.unwrap();
        let late = late.unwrap();
        assert_eq!(early.generation, second);
        assert_eq!(late.generation, second);
        assert_eq!(early.outcome.unwrap().regions.len(), 2);
    }

    #[tokio::test]
    async fn failures_are_published_as_errors() {
        let worker = Arc::new(SegmentWorker::spawn(1500).unwrap());
        let scheduler = SegmentScheduler::new(worker, Duration::ZERO);
        let mut updates = scheduler.subscribe();

        scheduler.trigger(Arc::new(RgbaImage::new(0, 0)), SegmentationRequest::default());
        updates.changed().await.unwrap();
        let published = scheduler.latest().unwrap();
        let err = published.outcome.expect_err("empty page must fail");
        assert!(matches!(err.as_ref(), SegmentError::EmptyImage { .. }));
    }
}
