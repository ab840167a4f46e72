use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::entry::{format_name, Category, Entry, SortKey};
use super::store::SharedDeckStore;
use super::view::{DeckSummary, DerivedView, Notice, ViewCache, ViewQuery};
use crate::error::{DeckError, DeckResult};
use crate::storage::{DeckGateway, DeckOrder};

/// Where an entry sits relative to the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPhase {
    Browsed,
    Adding,
    InDeck,
    Removing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    Deck,
    Entry(i64),
    Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Notice(Notice),
    Failure { scope: FailureScope, text: String },
}

impl Message {
    pub fn text(&self) -> String {
        match self {
            Message::Notice(notice) => notice.to_string(),
            Message::Failure { text, .. } => text.clone(),
        }
    }
}

/// Cleared by the consumer of a pending load when it goes away; a load that
/// finishes afterwards is discarded.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn retire(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied(usize),
    AlreadyLoaded,
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyInDeck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotInDeck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    Applied(usize),
    Cleared,
    Stale,
}

/// Issued by [`DeckCoordinator::begin_filter`]. Only the most recently issued
/// ticket may apply its result.
#[derive(Debug)]
pub struct FilterTicket {
    seq: u64,
    category: Category,
}

impl FilterTicket {
    pub fn category(&self) -> Category {
        self.category
    }
}

#[derive(Debug)]
struct ActiveSubset {
    category: Category,
    entries: Vec<Entry>,
}

#[derive(Debug, Default)]
struct FilterState {
    category: Option<Category>,
    subset: Option<ActiveSubset>,
    pending: bool,
    revision: u64,
    seq: u64,
}

impl FilterState {
    fn clear(&mut self) {
        self.seq += 1;
        self.category = None;
        self.pending = false;
        if self.subset.take().is_some() {
            self.revision += 1;
        }
    }
}

#[derive(Debug, Default)]
struct ViewState {
    query: ViewQuery,
    filter: FilterState,
    message: Option<Message>,
    entry_errors: HashMap<i64, String>,
    pending: HashMap<i64, EntryPhase>,
    cache: ViewCache,
}

impl ViewState {
    /// Drops a message left behind by an earlier filter request.
    fn clear_filter_message(&mut self) {
        if matches!(
            self.message,
            Some(Message::Notice(Notice::NoCategoryEntries { .. }))
                | Some(Message::Failure {
                    scope: FailureScope::Filter,
                    ..
                })
        ) {
            self.message = None;
        }
    }
}

/// Everything a surface needs to draw the deck, copied out under one lock.
#[derive(Debug, Clone)]
pub struct DeckSnapshot {
    pub view: DerivedView,
    pub summary: DeckSummary,
    pub query: ViewQuery,
    pub filter: Option<Category>,
    pub filter_pending: bool,
    pub loaded: bool,
    pub message: Option<Message>,
    pub entry_errors: HashMap<i64, String>,
    pending: HashMap<i64, EntryPhase>,
    deck_ids: HashSet<i64>,
}

impl DeckSnapshot {
    pub fn phase(&self, id: i64) -> EntryPhase {
        match self.pending.get(&id) {
            Some(phase) => *phase,
            None if self.deck_ids.contains(&id) => EntryPhase::InDeck,
            None => EntryPhase::Browsed,
        }
    }

    /// The empty-deck notice once the deck has loaded empty, else the view
    /// notice, else the empty-category notice of the active filter.
    pub fn notice(&self) -> Option<Notice> {
        if self.loaded && self.summary.count == 0 {
            return Some(Notice::DeckEmpty);
        }
        if self.view.notice.is_some() {
            return self.view.notice.clone();
        }
        match &self.message {
            Some(Message::Notice(notice @ Notice::NoCategoryEntries { category }))
                if self.filter == Some(*category) =>
            {
                Some(notice.clone())
            }
            _ => None,
        }
    }
}

/// Applies add/remove/filter/load requests against the gateway and reconciles
/// their results into the shared store and the filtered subset.
///
/// In-memory state only changes after the gateway reports success. Locks are
/// never held across an await; store access always happens after the view
/// state lock is taken, never before.
pub struct DeckCoordinator<G> {
    gateway: Arc<G>,
    store: SharedDeckStore,
    state: Mutex<ViewState>,
    entry_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl<G: DeckGateway> DeckCoordinator<G> {
    pub fn new(gateway: Arc<G>, store: SharedDeckStore) -> Self {
        Self {
            gateway,
            store,
            state: Mutex::new(ViewState::default()),
            entry_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SharedDeckStore {
        &self.store
    }

    /// One-shot initial load of the store.
    pub async fn load_deck(
        &self,
        liveness: &Liveness,
        order: Option<DeckOrder>,
    ) -> DeckResult<LoadOutcome> {
        let epoch = {
            let store = self.store.read();
            if store.is_loaded() {
                return Ok(LoadOutcome::AlreadyLoaded);
            }
            store.epoch()
        };

        let gateway = Arc::clone(&self.gateway);
        let entries = match run_blocking(move || gateway.load_all(order)).await {
            Ok(entries) => entries,
            Err(err) => {
                if liveness.is_alive() {
                    self.record_failure(
                        FailureScope::Deck,
                        format!("Could not load your deck: {err}"),
                        &err,
                    );
                }
                return Err(err);
            }
        };

        if !liveness.is_alive() {
            tracing::debug!("deck consumer retired before load finished, discarding");
            return Ok(LoadOutcome::Discarded);
        }
        let mut store = self.store.write();
        if store.epoch() != epoch || store.is_loaded() {
            tracing::debug!("deck store changed while loading, discarding");
            return Ok(LoadOutcome::Discarded);
        }
        store.install_loaded(entries);
        let count = store.len();
        tracing::info!(count, "deck loaded");
        Ok(LoadOutcome::Applied(count))
    }

    pub async fn add(&self, entry: Entry) -> DeckResult<AddOutcome> {
        let id = entry.id;
        let lock = self.entry_lock(id);
        let _guard = lock.lock().await;

        let present = self.store.read().contains(id);
        if present {
            tracing::info!(entry_id = id, name = %entry.name, "entry already in deck");
            self.state.lock().message = Some(Message::Notice(Notice::AlreadyInDeck {
                name: format_name(&entry.name),
            }));
            return Ok(AddOutcome::AlreadyInDeck);
        }

        self.set_phase(id, EntryPhase::Adding);
        let gateway = Arc::clone(&self.gateway);
        let persisted = entry.clone();
        let result = run_blocking(move || gateway.insert(&persisted)).await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.pending.remove(&id);
        match result {
            Ok(()) => {
                self.store.write().add(entry.clone());
                state.entry_errors.remove(&id);
                if let Some(subset) = state.filter.subset.as_mut() {
                    if entry.has_category(subset.category)
                        && !subset.entries.iter().any(|e| e.id == id)
                    {
                        subset.entries.push(entry.clone());
                        state.filter.revision += 1;
                    }
                }
                tracing::info!(entry_id = id, name = %entry.name, "added to deck");
                Ok(AddOutcome::Added)
            }
            Err(err) => {
                drop(guard);
                self.record_failure(
                    FailureScope::Entry(id),
                    format!("Could not add {}: {err}", format_name(&entry.name)),
                    &err,
                );
                Err(err)
            }
        }
    }

    pub async fn remove(&self, id: i64) -> DeckResult<RemoveOutcome> {
        let lock = self.entry_lock(id);
        let _guard = lock.lock().await;

        let name = self.store.read().get(id).map(|entry| format_name(&entry.name));
        let Some(name) = name else {
            tracing::info!(entry_id = id, "remove requested for entry not in deck");
            self.state.lock().message = Some(Message::Notice(Notice::NotInDeck {
                name: format!("#{id}"),
            }));
            return Ok(RemoveOutcome::NotInDeck);
        };

        self.set_phase(id, EntryPhase::Removing);
        let gateway = Arc::clone(&self.gateway);
        let result = run_blocking(move || gateway.remove(id)).await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.pending.remove(&id);
        match result {
            Ok(()) => {
                self.store.write().remove(id);
                state.entry_errors.remove(&id);
                if let Some(subset) = state.filter.subset.as_mut() {
                    let before = subset.entries.len();
                    subset.entries.retain(|e| e.id != id);
                    if subset.entries.len() != before {
                        state.filter.revision += 1;
                    }
                }
                tracing::info!(entry_id = id, %name, "removed from deck");
                Ok(RemoveOutcome::Removed)
            }
            Err(err) => {
                drop(guard);
                self.record_failure(
                    FailureScope::Entry(id),
                    format!("Could not remove {name}: {err}"),
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Selects a category filter; `None` clears it. The previous subset stays
    /// in place until the new one arrives.
    pub async fn set_category_filter(
        &self,
        category: Option<Category>,
    ) -> DeckResult<FilterOutcome> {
        let Some(ticket) = self.begin_filter(category) else {
            return Ok(FilterOutcome::Cleared);
        };
        let gateway = Arc::clone(&self.gateway);
        let category = ticket.category;
        let result = run_blocking(move || gateway.load_filtered(category)).await;
        self.complete_filter(ticket, result)
    }

    pub fn begin_filter(&self, category: Option<Category>) -> Option<FilterTicket> {
        let mut state = self.state.lock();
        match category {
            None => {
                state.filter.clear();
                state.clear_filter_message();
                None
            }
            Some(category) => {
                state.filter.seq += 1;
                state.filter.category = Some(category);
                state.filter.pending = true;
                Some(FilterTicket {
                    seq: state.filter.seq,
                    category,
                })
            }
        }
    }

    pub fn complete_filter(
        &self,
        ticket: FilterTicket,
        result: DeckResult<Vec<Entry>>,
    ) -> DeckResult<FilterOutcome> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if ticket.seq != state.filter.seq {
            tracing::debug!(
                category = %ticket.category,
                seq = ticket.seq,
                latest = state.filter.seq,
                "discarding stale filter result"
            );
            return Ok(FilterOutcome::Stale);
        }
        state.filter.pending = false;

        match result {
            Ok(mut entries) => {
                let (deck_empty, loaded) = {
                    let store = self.store.read();
                    if store.is_loaded() {
                        // Adds and removes that committed while the query ran.
                        entries.retain(|e| store.contains(e.id));
                        let missing: Vec<Entry> = store
                            .entries()
                            .filter(|e| e.has_category(ticket.category))
                            .filter(|e| !entries.iter().any(|have| have.id == e.id))
                            .cloned()
                            .collect();
                        entries.extend(missing);
                    }
                    (store.is_empty(), store.is_loaded())
                };
                let count = entries.len();
                state.clear_filter_message();
                if count == 0 && (!deck_empty || !loaded) {
                    state.message = Some(Message::Notice(Notice::NoCategoryEntries {
                        category: ticket.category,
                    }));
                }
                state.filter.subset = Some(ActiveSubset {
                    category: ticket.category,
                    entries,
                });
                state.filter.revision += 1;
                Ok(FilterOutcome::Applied(count))
            }
            Err(err) => {
                drop(guard);
                self.record_failure(
                    FailureScope::Filter,
                    format!("Could not filter by {}: {err}", ticket.category),
                    &err,
                );
                Err(err)
            }
        }
    }

    pub fn set_search(&self, term: impl Into<String>) {
        self.state.lock().query.search = term.into();
    }

    pub fn set_sort(&self, key: SortKey, ascending: bool) {
        let mut state = self.state.lock();
        state.query.sort_key = key;
        state.query.ascending = ascending;
    }

    pub fn query(&self) -> ViewQuery {
        self.state.lock().query.clone()
    }

    pub fn active_filter(&self) -> Option<Category> {
        self.state.lock().filter.category
    }

    /// Back to the default view: no search, name ascending, no filter, no
    /// messages. The deck itself is not refetched.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.query = ViewQuery::default();
        state.filter.clear();
        state.message = None;
        state.entry_errors.clear();
    }

    pub fn phase_of(&self, id: i64) -> EntryPhase {
        let state = self.state.lock();
        if let Some(phase) = state.pending.get(&id) {
            return *phase;
        }
        if self.store.read().contains(id) {
            EntryPhase::InDeck
        } else {
            EntryPhase::Browsed
        }
    }

    pub fn snapshot(&self) -> DeckSnapshot {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let store = self.store.read();
        let subset = state
            .filter
            .subset
            .as_ref()
            .map(|subset| subset.entries.as_slice());
        let view = state
            .cache
            .view(
                store.revision(),
                store.entries(),
                state.filter.revision,
                subset,
                &state.query,
            )
            .clone();
        let summary = state
            .cache
            .summary(store.revision(), store.entries())
            .clone();

        DeckSnapshot {
            view,
            summary,
            query: state.query.clone(),
            filter: state.filter.category,
            filter_pending: state.filter.pending,
            loaded: store.is_loaded(),
            message: state.message.clone(),
            entry_errors: state.entry_errors.clone(),
            pending: state.pending.clone(),
            deck_ids: store.entries().map(|entry| entry.id).collect(),
        }
    }

    fn set_phase(&self, id: i64, phase: EntryPhase) {
        self.state.lock().pending.insert(id, phase);
    }

    fn record_failure(&self, scope: FailureScope, text: String, err: &DeckError) {
        tracing::error!(error = ?err, ?scope, "{text}");
        let mut state = self.state.lock();
        if let FailureScope::Entry(id) = scope {
            state.entry_errors.insert(id, text.clone());
        }
        state.message = Some(Message::Failure { scope, text });
    }

    fn entry_lock(&self, id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.entry_locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(id).or_default())
    }
}

async fn run_blocking<T, F>(job: F) -> DeckResult<T>
where
    F: FnOnce() -> DeckResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(result) => result,
        Err(join_err) => Err(anyhow::anyhow!("storage worker failed: {join_err}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::entry::Attributes;
    use crate::deck::store::DeckStore;
    use assert_matches::assert_matches;
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;

    type Hook = Box<dyn FnOnce() + Send>;

    #[derive(Default)]
    struct FakeGateway {
        rows: Mutex<Vec<Entry>>,
        fail_insert: AtomicBool,
        fail_remove: AtomicBool,
        inserts: AtomicUsize,
        removes: AtomicUsize,
        on_load: Mutex<Option<Hook>>,
    }

    impl FakeGateway {
        fn with_rows(rows: Vec<Entry>) -> Self {
            Self {
                rows: Mutex::new(rows),
                ..Self::default()
            }
        }

        fn ids(&self) -> Vec<i64> {
            self.rows.lock().iter().map(|e| e.id).collect()
        }
    }

    impl DeckGateway for FakeGateway {
        fn load_all(&self, _order: Option<DeckOrder>) -> DeckResult<Vec<Entry>> {
            if let Some(hook) = self.on_load.lock().take() {
                hook();
            }
            Ok(self.rows.lock().clone())
        }

        fn load_filtered(&self, category: Category) -> DeckResult<Vec<Entry>> {
            Ok(self
                .rows
                .lock()
                .iter()
                .filter(|e| e.has_category(category))
                .cloned()
                .collect())
        }

        fn insert(&self, entry: &Entry) -> DeckResult<()> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("disk full").into());
            }
            for label in &entry.categories {
                if Category::from_str(label).is_err() {
                    return Err(DeckError::CategoryNotFound(label.clone()));
                }
            }
            self.rows.lock().push(entry.clone());
            Ok(())
        }

        fn remove(&self, id: i64) -> DeckResult<()> {
            self.removes.fetch_add(1, Ordering::SeqCst);
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("database is locked").into());
            }
            self.rows.lock().retain(|e| e.id != id);
            Ok(())
        }
    }

    fn creature(id: i64, name: &str, categories: &[&str], stats: [u32; 6]) -> Entry {
        Entry::new(
            id,
            name,
            "",
            categories.iter().map(|c| c.to_string()).collect(),
            Attributes::new(stats),
        )
    }

    fn bulbasaur() -> Entry {
        creature(1, "bulbasaur", &["grass", "poison"], [45, 49, 49, 65, 65, 45])
    }

    fn charmander() -> Entry {
        creature(4, "charmander", &["fire"], [39, 52, 43, 60, 50, 65])
    }

    fn charizard() -> Entry {
        creature(6, "charizard", &["fire", "flying"], [78, 84, 78, 109, 85, 100])
    }

    fn squirtle() -> Entry {
        creature(7, "squirtle", &["water"], [44, 48, 65, 50, 64, 43])
    }

    async fn loaded(rows: Vec<Entry>) -> (Arc<FakeGateway>, DeckCoordinator<FakeGateway>) {
        let gateway = Arc::new(FakeGateway::with_rows(rows));
        let coordinator = DeckCoordinator::new(Arc::clone(&gateway), DeckStore::shared());
        let outcome = coordinator
            .load_deck(&Liveness::new(), None)
            .await
            .expect("initial load");
        assert_matches!(outcome, LoadOutcome::Applied(_));
        (gateway, coordinator)
    }

    fn view_ids(coordinator: &DeckCoordinator<FakeGateway>) -> Vec<i64> {
        coordinator
            .snapshot()
            .view
            .entries
            .iter()
            .map(|e| e.id)
            .collect()
    }

    #[tokio::test]
    async fn initial_load_runs_once() {
        let (gateway, coordinator) = loaded(vec![bulbasaur(), squirtle()]).await;
        gateway.rows.lock().push(charmander());
        let again = coordinator.load_deck(&Liveness::new(), None).await.unwrap();
        assert_eq!(again, LoadOutcome::AlreadyLoaded);
        assert_eq!(coordinator.store().read().len(), 2);
    }

    #[tokio::test]
    async fn retired_consumer_discards_late_load() {
        let gateway = Arc::new(FakeGateway::with_rows(vec![bulbasaur()]));
        let coordinator = DeckCoordinator::new(gateway, DeckStore::shared());
        let liveness = Liveness::new();
        liveness.retire();
        let outcome = coordinator.load_deck(&liveness, None).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Discarded);
        assert!(!coordinator.store().read().is_loaded());
        assert!(coordinator.store().read().is_empty());
    }

    #[tokio::test]
    async fn store_reset_during_load_discards_result() {
        let store = DeckStore::shared();
        let gateway = Arc::new(FakeGateway::with_rows(vec![bulbasaur()]));
        let reset_target = Arc::clone(&store);
        *gateway.on_load.lock() = Some(Box::new(move || reset_target.write().reset()));
        let coordinator = DeckCoordinator::new(gateway, store);

        let outcome = coordinator.load_deck(&Liveness::new(), None).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Discarded);

        // The reset re-armed the one-shot load.
        let outcome = coordinator.load_deck(&Liveness::new(), None).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Applied(1));
    }

    #[tokio::test]
    async fn add_commits_after_gateway_success() {
        let (gateway, coordinator) = loaded(vec![]).await;
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.notice(), Some(Notice::DeckEmpty));

        let outcome = coordinator.add(charmander()).await.unwrap();
        assert_eq!(outcome, AddOutcome::Added);
        assert_eq!(gateway.ids(), vec![4]);
        assert_eq!(coordinator.phase_of(4), EntryPhase::InDeck);
        assert_eq!(coordinator.snapshot().notice(), None);
    }

    #[tokio::test]
    async fn duplicate_add_is_a_notice_not_a_write() {
        let (gateway, coordinator) = loaded(vec![charmander()]).await;
        let outcome = coordinator.add(charmander()).await.unwrap();
        assert_eq!(outcome, AddOutcome::AlreadyInDeck);
        assert_eq!(gateway.inserts.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.store().read().len(), 1);
        assert_eq!(
            coordinator.snapshot().message,
            Some(Message::Notice(Notice::AlreadyInDeck {
                name: "Charmander".to_string()
            }))
        );
    }

    #[tokio::test]
    async fn failed_add_leaves_deck_unchanged() {
        let (gateway, coordinator) = loaded(vec![bulbasaur()]).await;
        gateway.fail_insert.store(true, Ordering::SeqCst);

        let err = coordinator.add(squirtle()).await.expect_err("insert fails");
        assert_matches!(err, DeckError::Persistence(_));
        assert!(!coordinator.store().read().contains(7));
        assert_eq!(coordinator.phase_of(7), EntryPhase::Browsed);

        let snapshot = coordinator.snapshot();
        assert_matches!(
            snapshot.message,
            Some(Message::Failure {
                scope: FailureScope::Entry(7),
                ..
            })
        );
        assert!(snapshot.entry_errors.contains_key(&7));
    }

    #[tokio::test]
    async fn unknown_category_surfaces_as_add_failure() {
        let (_gateway, coordinator) = loaded(vec![]).await;
        let odd = creature(10001, "oddity", &["stellar"], [1; 6]);
        let err = coordinator.add(odd).await.expect_err("unknown category");
        assert_matches!(err, DeckError::CategoryNotFound(ref label) if label == "stellar");
        assert!(coordinator.store().read().is_empty());
    }

    #[tokio::test]
    async fn remove_after_add_restores_membership() {
        let (_gateway, coordinator) = loaded(vec![bulbasaur()]).await;
        let before: Vec<i64> = coordinator.store().read().entries().map(|e| e.id).collect();

        coordinator.add(squirtle()).await.unwrap();
        coordinator.remove(7).await.unwrap();

        let after: Vec<i64> = coordinator.store().read().entries().map(|e| e.id).collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn failed_remove_keeps_entry_and_retry_clears_error() {
        let (gateway, coordinator) = loaded(vec![bulbasaur(), squirtle()]).await;
        gateway.fail_remove.store(true, Ordering::SeqCst);

        coordinator.remove(7).await.expect_err("remove fails");
        assert!(coordinator.store().read().contains(7));
        assert_eq!(coordinator.phase_of(7), EntryPhase::InDeck);
        assert!(coordinator.snapshot().entry_errors.contains_key(&7));

        gateway.fail_remove.store(false, Ordering::SeqCst);
        assert_eq!(coordinator.remove(7).await.unwrap(), RemoveOutcome::Removed);
        assert!(!coordinator.store().read().contains(7));
        assert!(coordinator.snapshot().entry_errors.is_empty());
    }

    #[tokio::test]
    async fn removing_unknown_entry_skips_gateway() {
        let (gateway, coordinator) = loaded(vec![bulbasaur()]).await;
        assert_eq!(coordinator.remove(99).await.unwrap(), RemoveOutcome::NotInDeck);
        assert_eq!(gateway.removes.load(Ordering::SeqCst), 0);
        assert_matches!(
            coordinator.snapshot().message,
            Some(Message::Notice(Notice::NotInDeck { .. }))
        );
    }

    #[tokio::test]
    async fn racing_add_and_remove_apply_in_call_order() {
        let (gateway, coordinator) = loaded(vec![]).await;
        let (added, removed) = tokio::join!(coordinator.add(squirtle()), coordinator.remove(7));
        assert_eq!(added.unwrap(), AddOutcome::Added);
        assert_eq!(removed.unwrap(), RemoveOutcome::Removed);
        assert!(gateway.ids().is_empty());
        assert!(!coordinator.store().read().contains(7));
    }

    #[tokio::test]
    async fn water_filter_without_water_entries() {
        let (_gateway, coordinator) =
            loaded(vec![bulbasaur(), charmander(), charizard()]).await;
        let outcome = coordinator
            .set_category_filter(Some(Category::Water))
            .await
            .unwrap();
        assert_eq!(outcome, FilterOutcome::Applied(0));

        let snapshot = coordinator.snapshot();
        assert!(snapshot.view.entries.is_empty());
        assert_eq!(snapshot.summary.count, 3);
        assert_eq!(
            snapshot.message,
            Some(Message::Notice(Notice::NoCategoryEntries {
                category: Category::Water
            }))
        );
    }

    #[tokio::test]
    async fn filter_then_clear_restores_full_view() {
        let (_gateway, coordinator) =
            loaded(vec![bulbasaur(), charmander(), charizard(), squirtle()]).await;
        coordinator
            .set_category_filter(Some(Category::Fire))
            .await
            .unwrap();
        assert_eq!(view_ids(&coordinator), vec![6, 4]);

        let outcome = coordinator.set_category_filter(None).await.unwrap();
        assert_eq!(outcome, FilterOutcome::Cleared);
        assert_eq!(view_ids(&coordinator), vec![1, 6, 4, 7]);
    }

    #[tokio::test]
    async fn add_and_remove_keep_active_subset_in_step() {
        let (_gateway, coordinator) = loaded(vec![bulbasaur(), charmander()]).await;
        coordinator
            .set_category_filter(Some(Category::Fire))
            .await
            .unwrap();

        coordinator.add(charizard()).await.unwrap();
        coordinator.add(squirtle()).await.unwrap();
        assert_eq!(view_ids(&coordinator), vec![6, 4]);

        coordinator.remove(4).await.unwrap();
        assert_eq!(view_ids(&coordinator), vec![6]);
    }

    #[tokio::test]
    async fn filter_result_keeps_entry_added_while_pending() {
        let (_gateway, coordinator) = loaded(vec![bulbasaur(), charmander()]).await;
        let fire = coordinator.begin_filter(Some(Category::Fire)).unwrap();

        coordinator.add(charizard()).await.unwrap();
        // The query ran before the insert committed.
        let outcome = coordinator.complete_filter(fire, Ok(vec![charmander()])).unwrap();
        assert_eq!(outcome, FilterOutcome::Applied(2));
        assert_eq!(view_ids(&coordinator), vec![6, 4]);
    }

    #[tokio::test]
    async fn filter_result_drops_entry_removed_while_pending() {
        let (_gateway, coordinator) = loaded(vec![charmander(), charizard()]).await;
        let fire = coordinator.begin_filter(Some(Category::Fire)).unwrap();

        coordinator.remove(4).await.unwrap();
        let outcome = coordinator
            .complete_filter(fire, Ok(vec![charmander(), charizard()]))
            .unwrap();
        assert_eq!(outcome, FilterOutcome::Applied(1));
        assert_eq!(view_ids(&coordinator), vec![6]);
    }

    #[tokio::test]
    async fn add_committed_during_initial_load_is_kept() {
        let store = DeckStore::shared();
        let gateway = Arc::new(FakeGateway::with_rows(vec![bulbasaur()]));
        let late_add = Arc::clone(&store);
        *gateway.on_load.lock() = Some(Box::new(move || {
            late_add.write().add(charizard());
        }));
        let coordinator = DeckCoordinator::new(gateway, store);

        let outcome = coordinator.load_deck(&Liveness::new(), None).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Applied(2));
        let ids: Vec<i64> = coordinator.store().read().entries().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 6]);
        assert_eq!(coordinator.phase_of(6), EntryPhase::InDeck);
    }

    #[tokio::test]
    async fn add_during_initial_load_reaches_store_and_gateway() {
        let store = DeckStore::shared();
        let gateway = Arc::new(FakeGateway::with_rows(vec![bulbasaur()]));
        let coordinator = DeckCoordinator::new(Arc::clone(&gateway), store);

        let liveness = Liveness::new();
        let (load, added) = tokio::join!(
            coordinator.load_deck(&liveness, None),
            coordinator.add(squirtle())
        );
        assert_matches!(load.unwrap(), LoadOutcome::Applied(_));
        assert_eq!(added.unwrap(), AddOutcome::Added);
        let mut ids: Vec<i64> = coordinator.store().read().entries().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 7]);
        assert_eq!(gateway.ids(), vec![1, 7]);
    }

    #[tokio::test]
    async fn successful_filter_replaces_empty_category_notice() {
        let (_gateway, coordinator) = loaded(vec![bulbasaur(), charmander()]).await;
        coordinator
            .set_category_filter(Some(Category::Water))
            .await
            .unwrap();
        assert_eq!(
            coordinator.snapshot().notice(),
            Some(Notice::NoCategoryEntries {
                category: Category::Water
            })
        );

        coordinator
            .set_category_filter(Some(Category::Fire))
            .await
            .unwrap();
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.message, None);
        assert_eq!(snapshot.notice(), None);
        assert_eq!(view_ids(&coordinator), vec![4]);
    }

    #[test]
    fn only_the_latest_filter_ticket_applies() {
        let coordinator = DeckCoordinator::new(
            Arc::new(FakeGateway::default()),
            DeckStore::shared(),
        );
        {
            let mut store = coordinator.store().write();
            store.replace(vec![charmander(), squirtle()]);
            store.set_loaded();
        }

        let fire = coordinator.begin_filter(Some(Category::Fire)).unwrap();
        let water = coordinator.begin_filter(Some(Category::Water)).unwrap();

        let applied = coordinator.complete_filter(water, Ok(vec![squirtle()])).unwrap();
        assert_eq!(applied, FilterOutcome::Applied(1));
        let stale = coordinator.complete_filter(fire, Ok(vec![charmander()])).unwrap();
        assert_eq!(stale, FilterOutcome::Stale);

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.filter, Some(Category::Water));
        assert_eq!(snapshot.view.entries.len(), 1);
        assert_eq!(snapshot.view.entries[0].id, 7);
    }

    #[test]
    fn clearing_discards_in_flight_filter() {
        let coordinator = DeckCoordinator::new(
            Arc::new(FakeGateway::default()),
            DeckStore::shared(),
        );
        coordinator.store().write().replace(vec![charmander()]);

        let fire = coordinator.begin_filter(Some(Category::Fire)).unwrap();
        assert!(coordinator.snapshot().filter_pending);
        assert!(coordinator.begin_filter(None).is_none());

        let outcome = coordinator.complete_filter(fire, Ok(vec![charmander()])).unwrap();
        assert_eq!(outcome, FilterOutcome::Stale);
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.filter, None);
        assert!(!snapshot.filter_pending);
    }

    #[tokio::test]
    async fn summary_ignores_search_and_filter() {
        let (_gateway, coordinator) =
            loaded(vec![bulbasaur(), charmander(), squirtle()]).await;
        let full = coordinator.snapshot().summary;

        coordinator.set_search("char");
        coordinator
            .set_category_filter(Some(Category::Water))
            .await
            .unwrap();
        let snapshot = coordinator.snapshot();
        assert!(snapshot.view.entries.is_empty());
        assert_eq!(snapshot.summary, full);
        assert_eq!(snapshot.summary.count, 3);
    }

    #[tokio::test]
    async fn reset_restores_default_view() {
        let (_gateway, coordinator) = loaded(vec![bulbasaur(), squirtle()]).await;
        coordinator.set_search("squ");
        coordinator.set_sort(SortKey::Total, false);
        coordinator
            .set_category_filter(Some(Category::Water))
            .await
            .unwrap();
        coordinator.remove(99).await.unwrap();

        coordinator.reset();
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.query, ViewQuery::default());
        assert_eq!(snapshot.filter, None);
        assert_eq!(snapshot.message, None);
        assert_eq!(view_ids(&coordinator), vec![1, 7]);
        assert_eq!(coordinator.store().read().len(), 2);
    }
}
