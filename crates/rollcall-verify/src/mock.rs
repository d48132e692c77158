//! Mock collaborators for testing

use async_trait::async_trait;
use rollcall_api::GeoPoint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::{FaceMatch, FaceMatcher, ImageStore, LocationAssessor, VerifyError, VerifyResult};

/// Face matcher returning a configurable verdict
pub struct MockFaceMatcher {
    /// Verdict returned by every comparison
    pub verdict: Arc<Mutex<FaceMatch>>,

    /// Configure comparisons to fail
    pub fail: Arc<Mutex<bool>>,

    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockFaceMatcher {
    /// Matcher that accepts every capture with the given score
    pub fn with_score(score: f64) -> Self {
        Self {
            verdict: Arc::new(Mutex::new(FaceMatch {
                matched: true,
                score,
            })),
            fail: Arc::new(Mutex::new(false)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_verdict(&self, matched: bool, score: f64) {
        *self.verdict.lock().unwrap() = FaceMatch { matched, score };
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// (reference, capture) pairs seen so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockFaceMatcher {
    fn default() -> Self {
        Self::with_score(0.95)
    }
}

#[async_trait]
impl FaceMatcher for MockFaceMatcher {
    async fn compare(&self, reference: &str, capture: &str) -> VerifyResult<FaceMatch> {
        self.calls
            .lock()
            .unwrap()
            .push((reference.to_string(), capture.to_string()));

        if *self.fail.lock().unwrap() {
            return Err(VerifyError::Unavailable("Mock face matcher failure".into()));
        }
        Ok(*self.verdict.lock().unwrap())
    }
}

/// Image store that keeps nothing and hands out sequential references
#[derive(Default)]
pub struct MockImageStore {
    next_id: AtomicU64,
}

impl MockImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of images stored so far
    pub fn stored(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageStore for MockImageStore {
    async fn store(&self, bytes: &[u8], extension: &str) -> VerifyResult<String> {
        if bytes.is_empty() {
            return Err(VerifyError::InvalidInput("image is empty".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("mock://images/{}.{}", id, extension))
    }
}

/// Location assessor returning a fixed note for any captured point
#[derive(Default)]
pub struct MockLocationAssessor {
    pub note: Arc<Mutex<Option<String>>>,
}

impl MockLocationAssessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_note(&self, note: Option<&str>) {
        *self.note.lock().unwrap() = note.map(str::to_string);
    }
}

impl LocationAssessor for MockLocationAssessor {
    fn assess(&self, _class_point: Option<GeoPoint>, captured: Option<GeoPoint>) -> Option<String> {
        captured?;
        self.note.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_face_matcher_records_calls() {
        let matcher = MockFaceMatcher::with_score(0.8);
        let verdict = matcher.compare("ref", "cap").await.unwrap();
        assert_eq!(verdict, FaceMatch { matched: true, score: 0.8 });
        assert_eq!(matcher.calls(), vec![("ref".to_string(), "cap".to_string())]);

        matcher.set_fail(true);
        assert!(matcher.compare("ref", "cap").await.is_err());
    }

    #[tokio::test]
    async fn mock_image_store_counts() {
        let store = MockImageStore::new();
        assert_eq!(store.store(b"x", "jpg").await.unwrap(), "mock://images/1.jpg");
        assert_eq!(store.stored(), 1);
    }

    #[test]
    fn mock_assessor_needs_a_point() {
        let assessor = MockLocationAssessor::new();
        assessor.set_note(Some("far from class (300m)"));
        assert_eq!(assessor.assess(None, None), None);
        assert_eq!(
            assessor.assess(None, Some(GeoPoint::new(1.0, 1.0))).as_deref(),
            Some("far from class (300m)")
        );
    }
}
