// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory object store for engine tests.

use crate::s3::{ObjectInfo, ObjectStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct State {
    objects: HashMap<String, u64>,
    presigned: Vec<String>,
    /// Keys whose object appears after this many HEAD misses.
    pending: HashMap<String, (u32, u64)>,
}

/// Fake [`ObjectStore`] whose objects are inserted by the test (upload is
/// performed by the remote endpoint in production, so the fake just makes
/// objects appear).
#[derive(Clone)]
pub struct FakeObjectStore {
    bucket: String,
    state: Arc<Mutex<State>>,
}

impl FakeObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Insert an object, as if the endpoint's PUT completed.
    pub fn put_object(&self, key: &str, size: u64) {
        self.state.lock().objects.insert(key.to_string(), size);
    }

    /// Insert an object that only becomes HEAD-visible after `misses`
    /// failed checks, modeling upload latency.
    pub fn put_object_after(&self, key: &str, size: u64, misses: u32) {
        self.state
            .lock()
            .pending
            .insert(key.to_string(), (misses, size));
    }

    pub fn presigned_urls(&self) -> Vec<String> {
        self.state.lock().presigned.clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn presign_put(&self, key: &str, _expires_in: Duration) -> Result<String, StoreError> {
        let url = format!("https://{}.s3.amazonaws.com/{key}?signature=fake", self.bucket);
        self.state.lock().presigned.push(url.clone());
        Ok(url)
    }

    async fn head_object(&self, key: &str) -> Result<ObjectInfo, StoreError> {
        let mut state = self.state.lock();
        if let Some((misses, size)) = state.pending.get_mut(key) {
            if *misses == 0 {
                let size = *size;
                state.pending.remove(key);
                state.objects.insert(key.to_string(), size);
            } else {
                *misses -= 1;
            }
        }
        state
            .objects
            .get(key)
            .map(|size| ObjectInfo { size: *size })
            .ok_or_else(|| StoreError::NotFound(format!("s3://{}/{key}", self.bucket)))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
