use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use image::RgbaImage;

use crate::recognition::Recognizer;
use crate::segment::SegmentationRequest;
use crate::settings;
use crate::worker::{SegmentScheduler, SegmentWorker};

pub struct ServerState {
    pub settings: settings::Settings,
    pub worker: Arc<SegmentWorker>,
    pub recognizer: Arc<dyn Recognizer>,
    schedulers: Mutex<HashMap<String, SegmentScheduler>>,
}

impl ServerState {
    pub fn new(
        settings: settings::Settings,
        worker: Arc<SegmentWorker>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        Self {
            settings,
            worker,
            recognizer,
            schedulers: Mutex::new(HashMap::new()),
        }
    }

    /// Triggers segmentation through the page's scheduler, creating it on
    /// first use. Returns the scheduler and the trigger's generation.
    pub(crate) fn trigger_for_page(
        &self,
        page: Arc<RgbaImage>,
        request: SegmentationRequest,
    ) -> (SegmentScheduler, u64) {
        let debounce = Duration::from_millis(self.settings.debounce_ms);
        let mut schedulers = self.schedulers();
        let scheduler = schedulers
            .entry(request.page_id.clone())
            .or_insert_with(|| SegmentScheduler::new(self.worker.clone(), debounce))
            .clone();
        let generation = scheduler.trigger(page, request);
        (scheduler, generation)
    }

    /// Forgets the page's scheduler unless a newer trigger is pending on it.
    pub(crate) fn release_page(&self, page_id: &str, generation: u64) {
        let mut schedulers = self.schedulers();
        if schedulers
            .get(page_id)
            .is_some_and(|scheduler| scheduler.current_generation() == generation)
        {
            schedulers.remove(page_id);
        }
    }

    /// Pages with a scheduler still tracked.
    pub fn tracked_pages(&self) -> usize {
        self.schedulers().len()
    }

    fn schedulers(&self) -> MutexGuard<'_, HashMap<String, SegmentScheduler>> {
        self.schedulers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
