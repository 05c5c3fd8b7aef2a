//! In-process fakes for network and user collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use super::fetch::Fetcher;
use super::notify::Notifier;

/// Serves canned bodies by URL and records every request.
#[derive(Default)]
pub struct FakeFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, body: impl AsRef<[u8]>) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.as_ref().to_vec());
    }

    pub fn remove(&self, url: &str) {
        self.bodies.lock().unwrap().remove(url);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.bodies
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: {}", url))
    }
}

/// Answers questions from a script and records every message.
///
/// When the script runs out, every question is declined.
#[derive(Default)]
pub struct ScriptedNotifier {
    answers: Mutex<VecDeque<bool>>,
    shown: Mutex<Vec<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answering(answers: &[bool]) -> Self {
        let notifier = Self::new();
        notifier.answers.lock().unwrap().extend(answers);
        notifier
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    fn answer(&self, message: &str) -> bool {
        self.asked.lock().unwrap().push(message.to_string());
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    fn show(&self, message: &str) {
        self.shown.lock().unwrap().push(message.to_string());
    }

    async fn ask(&self, message: &str) -> bool {
        self.answer(message)
    }

    async fn prompt(&self, message: &str) -> bool {
        self.answer(message)
    }
}
