//! Card content loading: paginated bulk cards and lazily fetched sets.
//!
//! Both loops process one unit (page or set) at a time in declared order,
//! report it on the optional event channel, then yield to the scheduler so
//! other tasks can interleave. A failure is recorded on the descriptor and
//! stops the loop.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use url::Url;

use super::fetch::Fetcher;
use super::notify::{LoadEvent, LoadEventSender, Notifier};
use super::paths::{self, SETS_DIR};
use super::store::read_cards;
use super::types::{Card, LoadState, PackageDescriptor};

/// Page count above which loading start/finish messages are shown.
pub const DEFAULT_NOTIFY_THRESHOLD: u32 = 60;

const CARDS_LOADING_MESSAGE: &str = "cards loading...";
const CARDS_LOADED_MESSAGE: &str = "cards loaded!";
const SET_CARDS_LOADING_MESSAGE: &str = "set cards loading...";
const SET_CARDS_LOADED_MESSAGE: &str = "set cards loaded!";

// ============================================================================
// Page Source
// ============================================================================

/// Supplies one page of bulk card data.
#[async_trait]
pub trait CardPageSource: Send + Sync {
    async fn load_page(
        &self,
        descriptor: &PackageDescriptor,
        package_dir: &Path,
        page: u32,
    ) -> Result<Vec<Card>>;
}

/// Reads `cards/<page>.json`, fetching it from the package's card URL first
/// when it is not on disk yet.
pub struct StoreCardSource {
    fetcher: Arc<dyn Fetcher>,
}

impl StoreCardSource {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl CardPageSource for StoreCardSource {
    async fn load_page(
        &self,
        descriptor: &PackageDescriptor,
        package_dir: &Path,
        page: u32,
    ) -> Result<Vec<Card>> {
        let file = paths::page_file(package_dir, page);

        if !file.is_file() {
            let Some(url) = descriptor.metadata().page_url(page) else {
                debug!(id = %descriptor.id(), page, "No card data for page");
                return Ok(Vec::new());
            };
            let url = Url::parse(&url).with_context(|| format!("Invalid card page URL: {}", url))?;
            self.fetcher.save_to_file(&url, &file).await?;
        }

        read_cards(&file)
    }
}

// ============================================================================
// Content Loader
// ============================================================================

/// Fills a descriptor's cards from its package directory and remote URLs.
pub struct ContentLoader {
    fetcher: Arc<dyn Fetcher>,
    source: Arc<dyn CardPageSource>,
    notifier: Arc<dyn Notifier>,
    notify_threshold: u32,
}

impl ContentLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            source: Arc::new(StoreCardSource::new(fetcher.clone())),
            fetcher,
            notifier,
            notify_threshold: DEFAULT_NOTIFY_THRESHOLD,
        }
    }

    /// Replaces the bulk page source.
    pub fn with_source(mut self, source: Arc<dyn CardPageSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_notify_threshold(mut self, threshold: u32) -> Self {
        self.notify_threshold = threshold;
        self
    }

    /// Loads bulk cards, then sets. Leaves the descriptor `Loaded` either way.
    pub async fn load(
        &self,
        descriptor: &mut PackageDescriptor,
        package_dir: &Path,
        events: Option<&LoadEventSender>,
    ) {
        info!(id = %descriptor.id(), "Loading card content");

        self.load_bulk(descriptor, package_dir, events).await;
        if !descriptor.has_error() {
            self.load_sets_lazily(descriptor, package_dir, events).await;
        }

        if !descriptor.has_error() {
            send(
                events,
                LoadEvent::Finished {
                    package_id: descriptor.id().to_string(),
                },
            );
        }
    }

    /// Loads every bulk card page in order, stopping at the first failure.
    pub async fn load_bulk(
        &self,
        descriptor: &mut PackageDescriptor,
        package_dir: &Path,
        events: Option<&LoadEventSender>,
    ) {
        let pages = descriptor.metadata().page_range();
        let total = descriptor.metadata().all_cards_url_page_count;
        let noisy = total > self.notify_threshold;

        descriptor.set_load_state(LoadState::Loading);
        if noisy && !pages.is_empty() {
            self.notifier
                .show(&format!("{} {}", descriptor.name(), CARDS_LOADING_MESSAGE));
        }

        for (index, page) in pages.enumerate() {
            match self.source.load_page(descriptor, package_dir, page).await {
                Ok(cards) => {
                    debug!(id = %descriptor.id(), page, count = cards.len(), "Loaded card page");
                    descriptor.attach_cards(cards, None);
                }
                Err(e) => {
                    let message = format!("Failed to load card page {}: {:#}", page, e);
                    descriptor.set_error(message.clone());
                    send(
                        events,
                        LoadEvent::Failed {
                            package_id: descriptor.id().to_string(),
                            error: message,
                        },
                    );
                    break;
                }
            }

            send(
                events,
                LoadEvent::PageLoaded {
                    package_id: descriptor.id().to_string(),
                    page,
                    completed: index as u32 + 1,
                    total,
                },
            );
            tokio::task::yield_now().await;
        }

        descriptor.set_load_state(LoadState::Loaded);

        if let Some(err) = descriptor.error() {
            error!(id = %descriptor.id(), "Error loading game: {}", err);
        } else if noisy {
            self.notifier
                .show(&format!("{} {}", descriptor.name(), CARDS_LOADED_MESSAGE));
        }
    }

    /// Loads each not-yet-loaded set that has a cards URL, fetching its file
    /// when missing. Stops at the first set that cannot be loaded.
    pub async fn load_sets_lazily(
        &self,
        descriptor: &mut PackageDescriptor,
        package_dir: &Path,
        events: Option<&LoadEventSender>,
    ) {
        let pending: Vec<(usize, String, Url, String)> = descriptor
            .sets()
            .iter()
            .enumerate()
            .filter(|(_, set)| !set.loaded)
            .filter_map(|(index, set)| {
                let url = set.cards_url.clone()?;
                Some((index, set.code.clone(), url, set.file_name()))
            })
            .collect();

        let sets_dir = package_dir.join(SETS_DIR);
        let mut started = false;
        let mut loaded_any = false;

        for (index, code, url, file_name) in pending {
            let file = sets_dir.join(&file_name);

            if !file.is_file() {
                if !started {
                    started = true;
                    self.notifier
                        .show(&format!("{} {}", descriptor.name(), SET_CARDS_LOADING_MESSAGE));
                }
                if let Err(e) = self.fetcher.save_to_file(&url, &file).await {
                    warn!(id = %descriptor.id(), set = %code, "Failed to fetch set cards: {:#}", e);
                }
            }

            if !file.is_file() {
                self.fail(descriptor, events, format!("Set {} is unavailable from {}", code, url));
                break;
            }

            match read_cards(&file) {
                Ok(cards) => {
                    debug!(id = %descriptor.id(), set = %code, count = cards.len(), "Loaded set cards");
                    descriptor.attach_cards(cards, Some(&code));
                    if let Some(set) = descriptor.sets_mut().get_mut(index) {
                        set.loaded = true;
                    }
                    loaded_any = true;
                    send(
                        events,
                        LoadEvent::SetLoaded {
                            package_id: descriptor.id().to_string(),
                            set_code: code,
                        },
                    );
                }
                Err(e) => {
                    self.fail(descriptor, events, format!("{:#}", e));
                    break;
                }
            }

            tokio::task::yield_now().await;
        }

        if let Some(err) = descriptor.error() {
            error!(id = %descriptor.id(), "Error loading game: {}", err);
        } else if started && loaded_any {
            self.notifier
                .show(&format!("{} {}", descriptor.name(), SET_CARDS_LOADED_MESSAGE));
        }
    }

    fn fail(
        &self,
        descriptor: &mut PackageDescriptor,
        events: Option<&LoadEventSender>,
        message: String,
    ) {
        descriptor.set_error(message.clone());
        send(
            events,
            LoadEvent::Failed {
                package_id: descriptor.id().to_string(),
                error: message,
            },
        );
    }
}

fn send(events: Option<&LoadEventSender>, event: LoadEvent) {
    if let Some(tx) = events {
        // Receiver may have gone away; loading continues regardless.
        let _ = tx.send(event);
    }
}
