//! 单次页面加载对应的会话上下文。
//!
//! 捕获列表、两个锁定的清单地址、拼页模式和单飞标记都归会话所有，
//! 由调用方显式传给各个操作。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::models::{Mode, PipelineError};
use crate::capture::observer::RequestObserver;
use crate::capture::request_capture::{
    CaptureChange, CaptureListener, CapturedRequest, RequestCapture, url_prefix,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Url1,
    Url2,
}

impl Slot {
    pub fn label(self) -> &'static str {
        match self {
            Slot::Url1 => "URL-1",
            Slot::Url2 => "URL-2",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSlots {
    pub url1: Option<String>,
    pub url2: Option<String>,
    pub mode: Mode,
}

impl RunSlots {
    fn get(&self, slot: Slot) -> Option<&String> {
        match slot {
            Slot::Url1 => self.url1.as_ref(),
            Slot::Url2 => self.url2.as_ref(),
        }
    }

    fn get_mut(&mut self, slot: Slot) -> &mut Option<String> {
        match slot {
            Slot::Url1 => &mut self.url1,
            Slot::Url2 => &mut self.url2,
        }
    }
}

pub struct Session {
    api_marker: String,
    capture: Mutex<RequestCapture>,
    slots: Mutex<RunSlots>,
    busy: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub fn new(api_marker: impl Into<String>) -> Self {
        Self {
            api_marker: api_marker.into(),
            capture: Mutex::new(RequestCapture::new()),
            slots: Mutex::new(RunSlots::default()),
            busy: AtomicBool::new(false),
        }
    }

    pub fn with_mode(self, mode: Mode) -> Self {
        self.set_mode(mode);
        self
    }

    pub fn set_listener(&self, listener: CaptureListener) {
        lock(&self.capture).set_listener(listener);
    }

    /// 唯一的分类入口：不含清单接口标记的请求直接忽略。
    pub fn observe(&self, url: &str) -> CaptureChange {
        if !url.contains(&self.api_marker) {
            return CaptureChange::Ignored;
        }
        let change = lock(&self.capture).observe(url);
        match &change {
            CaptureChange::Inserted { index } => {
                debug!(target: "capture", index, url, "捕获到新的清单请求");
            }
            CaptureChange::Replaced {
                index,
                previous_url,
            } => {
                debug!(target: "capture", index, url, "清单请求已更新为更大的 page-to");
                let slots = lock(&self.slots);
                for slot in [Slot::Url1, Slot::Url2] {
                    if slots.get(slot) == Some(previous_url) {
                        warn!(
                            target: "capture",
                            slot = slot.label(),
                            stale = %previous_url,
                            newer = url,
                            "已锁定的地址落后于最新捕获，未自动更新"
                        );
                    }
                }
            }
            CaptureChange::Ignored => {}
        }
        change
    }

    pub fn captured(&self) -> Vec<CapturedRequest> {
        lock(&self.capture).entries().to_vec()
    }

    pub fn lock_slot(&self, slot: Slot, url: impl Into<String>) {
        let url = url.into();
        debug!(target: "capture", slot = slot.label(), url = %url, "锁定地址");
        *lock(&self.slots).get_mut(slot) = Some(url);
    }

    /// 把捕获列表第 `index` 条锁定到槽位，越界时返回 `None`。
    pub fn lock_captured(&self, slot: Slot, index: usize) -> Option<String> {
        let url = lock(&self.capture).entries().get(index)?.url.clone();
        self.lock_slot(slot, url.clone());
        Some(url)
    }

    #[cfg(test)]
    pub fn clear_slot(&self, slot: Slot) {
        *lock(&self.slots).get_mut(slot) = None;
    }

    pub fn set_mode(&self, mode: Mode) {
        lock(&self.slots).mode = mode;
    }

    pub fn slots(&self) -> RunSlots {
        lock(&self.slots).clone()
    }

    /// 已锁定、但同前缀下已有更大 `page-to` 捕获的槽位。
    pub fn stale_slots(&self) -> Vec<Slot> {
        let capture = lock(&self.capture);
        let slots = lock(&self.slots);
        [Slot::Url1, Slot::Url2]
            .into_iter()
            .filter(|&slot| {
                let Some(locked) = slots.get(slot) else {
                    return false;
                };
                let prefix = url_prefix(locked);
                capture
                    .entries()
                    .iter()
                    .any(|e| e.prefix == prefix && &e.url != locked)
            })
            .collect()
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// 单飞：同一时间只允许一次运行，守卫释放时清除标记。
    pub fn try_begin_run(&self) -> Result<RunGuard<'_>, PipelineError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::ConcurrentRunRejected)?;
        Ok(RunGuard { busy: &self.busy })
    }
}

impl RequestObserver for Session {
    fn on_request(&self, url: &str) -> CaptureChange {
        self.observe(url)
    }
}

#[must_use = "dropping the guard ends the run"]
pub struct RunGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const MARKER: &str = "/api/book/contentsInfo";

    fn manifest(cid: u32, page: u32) -> String {
        format!("https://comic-growl.com/api/book/contentsInfo?cid={cid}&page-to={page}")
    }

    #[test]
    fn requests_without_marker_are_ignored() {
        let session = Session::new(MARKER);
        assert_eq!(
            session.observe("https://comic-growl.com/static/app.js?page-to=3"),
            CaptureChange::Ignored
        );
        assert!(session.captured().is_empty());
    }

    #[test]
    fn second_run_is_rejected_until_guard_drops() {
        let session = Session::new(MARKER);
        let guard = session.try_begin_run().unwrap();
        assert!(session.is_busy());
        assert!(matches!(
            session.try_begin_run(),
            Err(PipelineError::ConcurrentRunRejected)
        ));
        drop(guard);
        assert!(!session.is_busy());
        assert!(session.try_begin_run().is_ok());
    }

    #[test]
    fn guard_is_released_on_panic() {
        let session = Arc::new(Session::new(MARKER));
        let worker = Arc::clone(&session);
        let result = std::thread::spawn(move || {
            let _guard = worker.try_begin_run().unwrap();
            panic!("stage blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!session.is_busy());
    }

    #[test]
    fn capture_proceeds_while_a_run_is_in_flight() {
        let session = Session::new(MARKER);
        let _guard = session.try_begin_run().unwrap();
        session.observe(&manifest(1, 2));
        assert_eq!(session.captured().len(), 1);
    }

    #[test]
    fn locked_slot_is_not_repointed_but_reported_stale() {
        let session = Session::new(MARKER);
        session.observe(&manifest(1, 2));
        assert_eq!(session.lock_captured(Slot::Url1, 0), Some(manifest(1, 2)));
        assert!(session.stale_slots().is_empty());

        session.observe(&manifest(1, 6));

        assert_eq!(session.slots().url1, Some(manifest(1, 2)));
        assert_eq!(session.stale_slots(), vec![Slot::Url1]);

        session.lock_captured(Slot::Url1, 0);
        assert!(session.stale_slots().is_empty());
    }

    #[test]
    fn slots_and_mode_are_session_owned() {
        let session = Session::new(MARKER).with_mode(Mode::RightOpenCover);
        session.lock_slot(Slot::Url2, "https://x/api/book/contentsInfo?cid=2");
        assert_eq!(session.lock_captured(Slot::Url1, 5), None);

        let slots = session.slots();
        assert_eq!(slots.mode, Mode::RightOpenCover);
        assert_eq!(slots.url1, None);
        assert!(slots.url2.is_some());

        session.clear_slot(Slot::Url2);
        assert_eq!(session.slots().url2, None);
    }

    #[test]
    fn observer_trait_routes_to_the_same_classifier() {
        let session = Session::new(MARKER);
        let observer: &dyn RequestObserver = &session;
        observer.on_request(&manifest(3, 1));
        observer.on_request("https://elsewhere/ping");
        assert_eq!(session.captured().len(), 1);
    }
}
