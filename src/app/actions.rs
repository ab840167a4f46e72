use std::sync::Arc;

use crossbeam_channel::Sender;
use tokio::runtime::Handle;

use crate::app::state::PageTicket;
use crate::catalog::{CatalogClient, CatalogPage};
use crate::deck::{
    AddOutcome, Category, DeckCoordinator, Entry, FilterOutcome, Liveness, LoadOutcome,
    RemoveOutcome,
};
use crate::storage::{DeckOrder, StorageHandle};

/// Completed background work, drained by the UI loop on every iteration.
#[derive(Debug)]
pub enum AppEvent {
    PageLoaded {
        ticket: PageTicket,
        result: Result<CatalogPage, String>,
    },
    DeckLoaded(Result<LoadOutcome, String>),
    Added {
        name: String,
        result: Result<AddOutcome, String>,
    },
    Removed {
        name: String,
        result: Result<RemoveOutcome, String>,
    },
    Filtered(Result<FilterOutcome, String>),
}

/// Runs coordinator and catalog calls on the runtime and reports back over
/// the event channel.
pub struct ActionDispatcher {
    handle: Handle,
    coordinator: Arc<DeckCoordinator<StorageHandle>>,
    catalog: CatalogClient,
    events: Sender<AppEvent>,
}

impl ActionDispatcher {
    pub fn new(
        handle: Handle,
        coordinator: Arc<DeckCoordinator<StorageHandle>>,
        catalog: CatalogClient,
        events: Sender<AppEvent>,
    ) -> Self {
        Self {
            handle,
            coordinator,
            catalog,
            events,
        }
    }

    pub fn coordinator(&self) -> &DeckCoordinator<StorageHandle> {
        &self.coordinator
    }

    pub fn load_deck(&self, liveness: Liveness, order: DeckOrder) {
        let coordinator = Arc::clone(&self.coordinator);
        let events = self.events.clone();
        self.handle.spawn(async move {
            let result = coordinator
                .load_deck(&liveness, Some(order))
                .await
                .map_err(|err| err.to_string());
            let _ = events.send(AppEvent::DeckLoaded(result));
        });
    }

    pub fn fetch_page(&self, ticket: PageTicket) {
        let catalog = self.catalog.clone();
        let events = self.events.clone();
        self.handle.spawn(async move {
            let result = catalog.fetch_page(ticket.page()).await.map_err(|err| {
                tracing::warn!(error = ?err, page = ticket.page(), "catalog page fetch failed");
                "Unable to load Pokemon. Please try again.".to_string()
            });
            let _ = events.send(AppEvent::PageLoaded { ticket, result });
        });
    }

    pub fn add(&self, entry: Entry) {
        let coordinator = Arc::clone(&self.coordinator);
        let events = self.events.clone();
        let name = entry.name.clone();
        self.handle.spawn(async move {
            let result = coordinator.add(entry).await.map_err(|err| err.to_string());
            let _ = events.send(AppEvent::Added { name, result });
        });
    }

    pub fn remove(&self, id: i64, name: String) {
        let coordinator = Arc::clone(&self.coordinator);
        let events = self.events.clone();
        self.handle.spawn(async move {
            let result = coordinator.remove(id).await.map_err(|err| err.to_string());
            let _ = events.send(AppEvent::Removed { name, result });
        });
    }

    pub fn filter(&self, category: Option<Category>) {
        let coordinator = Arc::clone(&self.coordinator);
        let events = self.events.clone();
        self.handle.spawn(async move {
            let result = coordinator
                .set_category_filter(category)
                .await
                .map_err(|err| err.to_string());
            let _ = events.send(AppEvent::Filtered(result));
        });
    }
}
