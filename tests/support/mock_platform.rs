//! In-memory stand-in for the platform download service.
//!
//! Jobs live in a table shared by every clone, so a fresh registry built on
//! the same mock behaves like a restarted process talking to the same
//! service. Every call is instrumented to detect overlapping calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bgdl_core::{BackendId, CompletionCallback, FinishState, PlatformDownloadService, PlatformError, PlatformJob};
use url::Url;

#[derive(Debug, Default)]
struct CallStats {
    in_call: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
    delay_ms: AtomicUsize,
}

impl CallStats {
    fn enter(&self) -> CallGuard<'_> {
        let now = self.in_call.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }
        CallGuard { stats: self }
    }
}

struct CallGuard<'a> {
    stats: &'a CallStats,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_call.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Integer finish codes as the service bridge reports them.
const CODE_PENDING: i32 = 0;
const CODE_SUCCESS: i32 = 1;
const CODE_FAILURE: i32 = -1;

struct JobStatus {
    finish_code: i32,
    error: String,
    progress: f32,
    check_error: Option<String>,
}

pub struct MockJob {
    stats: Arc<CallStats>,
    jobs: Arc<Mutex<HashMap<BackendId, Arc<MockJob>>>>,
    id: BackendId,
    url: String,
    destination_uri: String,
    headers: Mutex<Vec<(String, String)>>,
    allow_metered: Mutex<Option<bool>>,
    allow_roaming: Mutex<Option<bool>>,
    status: Mutex<JobStatus>,
    started: AtomicBool,
    finish_checks: AtomicUsize,
}

impl MockJob {
    pub fn headers(&self) -> Vec<(String, String)> {
        self.headers.lock().unwrap().clone()
    }

    pub fn allow_metered(&self) -> Option<bool> {
        *self.allow_metered.lock().unwrap()
    }

    pub fn allow_roaming(&self) -> Option<bool> {
        *self.allow_roaming.lock().unwrap()
    }

    pub fn destination_uri_raw(&self) -> &str {
        &self.destination_uri
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finish_checks(&self) -> usize {
        self.finish_checks.load(Ordering::SeqCst)
    }

    /// Local path of the temp file the job writes into.
    pub fn temp_file(&self) -> std::path::PathBuf {
        Url::parse(&self.destination_uri)
            .unwrap()
            .to_file_path()
            .unwrap()
    }
}

impl PlatformJob for MockJob {
    fn set_allow_metered(&self, allow: bool) -> Result<(), PlatformError> {
        let _call = self.stats.enter();
        *self.allow_metered.lock().unwrap() = Some(allow);
        Ok(())
    }

    fn set_allow_roaming(&self, allow: bool) -> Result<(), PlatformError> {
        let _call = self.stats.enter();
        *self.allow_roaming.lock().unwrap() = Some(allow);
        Ok(())
    }

    fn add_request_header(&self, name: &str, value: &str) -> Result<(), PlatformError> {
        let _call = self.stats.enter();
        self.headers
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn start(&self) -> Result<BackendId, PlatformError> {
        let _call = self.stats.enter();
        self.started.store(true, Ordering::SeqCst);
        Ok(self.id)
    }

    fn download_url(&self) -> Result<String, PlatformError> {
        let _call = self.stats.enter();
        Ok(self.url.clone())
    }

    fn destination_uri(&self) -> Result<String, PlatformError> {
        let _call = self.stats.enter();
        Ok(self.destination_uri.clone())
    }

    fn check_finished(&self) -> Result<FinishState, PlatformError> {
        let _call = self.stats.enter();
        self.finish_checks.fetch_add(1, Ordering::SeqCst);
        let mut status = self.status.lock().unwrap();
        if let Some(message) = status.check_error.take() {
            return Err(PlatformError::new("check_finished", message));
        }
        Ok(FinishState::from_code(status.finish_code))
    }

    fn error(&self) -> Result<String, PlatformError> {
        let _call = self.stats.enter();
        Ok(self.status.lock().unwrap().error.clone())
    }

    fn progress(&self) -> Result<f32, PlatformError> {
        let _call = self.stats.enter();
        Ok(self.status.lock().unwrap().progress)
    }

    fn remove(&self) -> Result<(), PlatformError> {
        let _call = self.stats.enter();
        self.jobs.lock().unwrap().remove(&self.id);
        Ok(())
    }
}

/// Mock service; clones share all state.
#[derive(Clone, Default)]
pub struct MockPlatform {
    stats: Arc<CallStats>,
    jobs: Arc<Mutex<HashMap<BackendId, Arc<MockJob>>>>,
    next_id: Arc<AtomicI64>,
    callback: Arc<Mutex<Option<CompletionCallback>>>,
    fail_next_create: Arc<Mutex<Option<String>>>,
    broken_recreate: Arc<Mutex<Vec<BackendId>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(&self) -> Arc<dyn PlatformDownloadService> {
        Arc::new(self.clone())
    }

    /// Every native call sleeps this long, widening any overlap window.
    pub fn set_call_delay(&self, delay: Duration) {
        self.stats
            .delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn peak_concurrent_calls(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.stats.total.load(Ordering::SeqCst)
    }

    pub fn job(&self, id: BackendId) -> Option<Arc<MockJob>> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn contains(&self, id: BackendId) -> bool {
        self.jobs.lock().unwrap().contains_key(&id)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn fail_next_create(&self, message: &str) {
        *self.fail_next_create.lock().unwrap() = Some(message.to_string());
    }

    /// Makes `recreate(id)` return an error.
    pub fn break_recreate(&self, id: BackendId) {
        self.broken_recreate.lock().unwrap().push(id);
    }

    /// Drops a job as if the service had discarded it.
    pub fn forget(&self, id: BackendId) {
        self.jobs.lock().unwrap().remove(&id);
    }

    /// Registers a job directly, as if started by some earlier process.
    pub fn insert_job(&self, url: &str, destination_uri: &str) -> BackendId {
        let job = self.new_job(url, destination_uri);
        job.started.store(true, Ordering::SeqCst);
        job.id
    }

    pub fn set_progress(&self, id: BackendId, progress: f32) {
        let job = self.job(id).unwrap();
        job.status.lock().unwrap().progress = progress;
    }

    /// Finishes a job successfully, writing `body` into its temp file.
    pub fn complete(&self, id: BackendId, body: &[u8]) {
        let job = self.job(id).unwrap();
        let temp = job.temp_file();
        std::fs::create_dir_all(temp.parent().unwrap()).unwrap();
        std::fs::write(&temp, body).unwrap();
        let mut status = job.status.lock().unwrap();
        status.finish_code = CODE_SUCCESS;
        status.progress = 1.0;
    }

    /// Finishes a job successfully without producing a temp file.
    pub fn complete_without_file(&self, id: BackendId) {
        let job = self.job(id).unwrap();
        job.status.lock().unwrap().finish_code = CODE_SUCCESS;
    }

    pub fn fail(&self, id: BackendId, message: &str) {
        let job = self.job(id).unwrap();
        let mut status = job.status.lock().unwrap();
        status.finish_code = CODE_FAILURE;
        status.error = message.to_string();
    }

    /// Makes the next `check_finished` call on `id` fail in the bridge.
    pub fn fail_next_check(&self, id: BackendId, message: &str) {
        let job = self.job(id).unwrap();
        job.status.lock().unwrap().check_error = Some(message.to_string());
    }

    /// Invokes the registered completion callback from a foreign thread.
    pub fn fire_completion(&self) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            std::thread::spawn(move || callback()).join().unwrap();
        }
    }

    pub fn has_callback(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    fn new_job(&self, url: &str, destination_uri: &str) -> Arc<MockJob> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let job = Arc::new(MockJob {
            stats: Arc::clone(&self.stats),
            jobs: Arc::clone(&self.jobs),
            id,
            url: url.to_string(),
            destination_uri: destination_uri.to_string(),
            headers: Mutex::new(Vec::new()),
            allow_metered: Mutex::new(None),
            allow_roaming: Mutex::new(None),
            status: Mutex::new(JobStatus {
                finish_code: CODE_PENDING,
                error: String::new(),
                progress: 0.0,
                check_error: None,
            }),
            started: AtomicBool::new(false),
            finish_checks: AtomicUsize::new(0),
        });
        self.jobs.lock().unwrap().insert(id, Arc::clone(&job));
        job
    }
}

impl PlatformDownloadService for MockPlatform {
    fn create(
        &self,
        url: &str,
        destination_uri: &str,
    ) -> Result<Arc<dyn PlatformJob>, PlatformError> {
        let _call = self.stats.enter();
        if let Some(message) = self.fail_next_create.lock().unwrap().take() {
            return Err(PlatformError::new("create", message));
        }
        Ok(self.new_job(url, destination_uri))
    }

    fn recreate(&self, id: BackendId) -> Result<Option<Arc<dyn PlatformJob>>, PlatformError> {
        let _call = self.stats.enter();
        if self.broken_recreate.lock().unwrap().contains(&id) {
            return Err(PlatformError::new("recreate", "service unavailable"));
        }
        Ok(self.job(id).map(|job| job as Arc<dyn PlatformJob>))
    }

    fn set_completion_callback(&self, callback: CompletionCallback) -> Result<(), PlatformError> {
        let _call = self.stats.enter();
        *self.callback.lock().unwrap() = Some(callback);
        Ok(())
    }
}
