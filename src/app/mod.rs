use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::TableState;
use ratatui::Terminal;
use tokio::runtime::Runtime;

use crate::catalog::CatalogClient;
use crate::config::AppConfig;
use crate::deck::{
    format_name, AddOutcome, DeckCoordinator, DeckStore, FilterOutcome, Liveness, LoadOutcome,
    Message, RemoveOutcome,
};
use crate::storage::StorageHandle;
use crate::ui;

mod actions;
pub mod state;

pub use actions::{ActionDispatcher, AppEvent};
pub use state::{next_filter, AppState, BrowseState, DeckPane, PageTicket, View};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    SwitchView,
    NextPage,
    PreviousPage,
    ReloadPage,
    AddSelected,
    StartSearch,
    CycleFilter,
    CycleSort,
    ToggleDirection,
    RemoveSelected,
    ResetView,
}

pub struct App {
    pub config: Arc<AppConfig>,
    state: AppState,
    table_state: TableState,
    should_quit: bool,
    tick_rate: Duration,
    dispatcher: ActionDispatcher,
    events: Receiver<AppEvent>,
    liveness: Liveness,
    _runtime: Runtime,
}

impl App {
    pub fn new(config: Arc<AppConfig>, storage: StorageHandle) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("pokedeck-worker")
            .build()
            .context("starting async runtime")?;
        let catalog = CatalogClient::new(&config.catalog)?;
        let coordinator = Arc::new(DeckCoordinator::new(
            Arc::new(storage),
            DeckStore::shared(),
        ));
        coordinator.set_sort(config.default_sort.key, config.default_sort.ascending());

        let (tx, rx) = unbounded();
        let dispatcher = ActionDispatcher::new(runtime.handle().clone(), coordinator, catalog, tx);
        Ok(Self {
            tick_rate: config.tick_rate(),
            config,
            state: AppState::new(),
            table_state: TableState::default(),
            should_quit: false,
            dispatcher,
            events: rx,
            liveness: Liveness::new(),
            _runtime: runtime,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        self.dispatcher
            .load_deck(self.liveness.clone(), self.config.default_sort.order());
        self.request_page(1);

        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        self.liveness.retire();
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            self.drain_events();
            let snapshot = self.dispatcher.coordinator().snapshot();
            terminal
                .draw(|frame| {
                    let selected = match self.state.view {
                        View::Browse if !self.state.browse.entries.is_empty() => {
                            Some(self.state.browse.selected)
                        }
                        View::Deck if !snapshot.view.entries.is_empty() => {
                            Some(self.state.deck.selected)
                        }
                        _ => None,
                    };
                    self.table_state.select(selected);
                    ui::draw_app(frame, &self.state, &snapshot, &mut self.table_state);
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                match event::read().context("reading terminal event")? {
                    Event::Key(key) => self.handle_key(key),
                    Event::Resize(_, _) => {}
                    _ => {}
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.state.is_search_active() {
            self.handle_search_key(key);
            return;
        }

        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let action = match (self.state.view, key.code) {
            (_, KeyCode::Char('q')) => Some(Action::Quit),
            (_, KeyCode::Char('c')) if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            (_, KeyCode::Tab) => Some(Action::SwitchView),
            (_, KeyCode::Char('j') | KeyCode::Down) => Some(Action::SelectNext),
            (_, KeyCode::Char('k') | KeyCode::Up) => Some(Action::SelectPrevious),
            (View::Browse, KeyCode::Char('n') | KeyCode::Right) if plain => Some(Action::NextPage),
            (View::Browse, KeyCode::Char('p') | KeyCode::Left) if plain => {
                Some(Action::PreviousPage)
            }
            (View::Browse, KeyCode::Char('r')) if plain => Some(Action::ReloadPage),
            (View::Browse, KeyCode::Char('a') | KeyCode::Enter) if plain => {
                Some(Action::AddSelected)
            }
            (View::Deck, KeyCode::Char('/')) if plain => Some(Action::StartSearch),
            (View::Deck, KeyCode::Char('f')) if plain => Some(Action::CycleFilter),
            (View::Deck, KeyCode::Char('s')) if plain => Some(Action::CycleSort),
            (View::Deck, KeyCode::Char('o')) if plain => Some(Action::ToggleDirection),
            (View::Deck, KeyCode::Char('d') | KeyCode::Delete) if plain => {
                Some(Action::RemoveSelected)
            }
            (View::Deck, KeyCode::Char('R')) => Some(Action::ResetView),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        let coordinator = self.dispatcher.coordinator();
        match key.code {
            KeyCode::Esc => {
                self.state.deck.search.active = false;
                self.state.deck.search.buffer.clear();
                coordinator.set_search("");
            }
            KeyCode::Enter => {
                self.state.deck.search.active = false;
            }
            KeyCode::Backspace => {
                if self.state.deck.search.pop() {
                    coordinator.set_search(self.state.deck.search.buffer.clone());
                }
            }
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER) =>
            {
                self.state.deck.search.push(ch);
                coordinator.set_search(self.state.deck.search.buffer.clone());
            }
            _ => return,
        }
        self.state.deck.selected = 0;
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => {
                self.should_quit = true;
            }
            Action::SelectNext => self.move_selection(1),
            Action::SelectPrevious => self.move_selection(-1),
            Action::SwitchView => self.state.toggle_view(),
            Action::NextPage => {
                if self.state.browse.can_go_next() {
                    self.request_page(self.state.browse.page + 1);
                }
            }
            Action::PreviousPage => {
                if self.state.browse.can_go_previous() {
                    self.request_page(self.state.browse.page - 1);
                }
            }
            Action::ReloadPage => {
                if !self.state.browse.loading {
                    self.request_page(self.state.browse.page);
                }
            }
            Action::AddSelected => self.handle_add_selected(),
            Action::StartSearch => {
                self.state.deck.search.active = true;
            }
            Action::CycleFilter => {
                let coordinator = self.dispatcher.coordinator();
                let next = next_filter(coordinator.active_filter());
                self.state.deck.selected = 0;
                self.dispatcher.filter(next);
            }
            Action::CycleSort => {
                let coordinator = self.dispatcher.coordinator();
                let query = coordinator.query();
                coordinator.set_sort(query.sort_key.cycle(), query.ascending);
            }
            Action::ToggleDirection => {
                let coordinator = self.dispatcher.coordinator();
                let query = coordinator.query();
                coordinator.set_sort(query.sort_key, !query.ascending);
            }
            Action::RemoveSelected => self.handle_remove_selected(),
            Action::ResetView => {
                self.dispatcher.coordinator().reset();
                self.state.deck.search = Default::default();
                self.state.deck.selected = 0;
                self.state.set_status_message(Some("View reset"));
            }
        }
    }

    fn move_selection(&mut self, delta: isize) {
        match self.state.view {
            View::Browse => self.state.browse.move_selection(delta),
            View::Deck => {
                let len = self.dispatcher.coordinator().snapshot().view.entries.len();
                self.state.deck.move_selection(len, delta);
            }
        }
    }

    fn request_page(&mut self, page: u32) {
        let ticket = self.state.browse.begin_request(page);
        self.dispatcher.fetch_page(ticket);
    }

    fn handle_add_selected(&mut self) {
        let Some(entry) = self.state.browse.selected_entry().cloned() else {
            return;
        };
        self.state
            .set_status_message(Some(format!("Adding {}…", format_name(&entry.name))));
        self.dispatcher.add(entry);
    }

    fn handle_remove_selected(&mut self) {
        let snapshot = self.dispatcher.coordinator().snapshot();
        let Some(entry) = snapshot.view.entries.get(self.state.deck.selected) else {
            return;
        };
        self.state
            .set_status_message(Some(format!("Removing {}…", format_name(&entry.name))));
        self.dispatcher.remove(entry.id, entry.name.clone());
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::PageLoaded { ticket, result } => {
                let failed = result.as_ref().err().cloned();
                if self.state.browse.complete(ticket, result) {
                    if let Some(message) = failed {
                        self.state.set_failure(message);
                    }
                }
            }
            AppEvent::DeckLoaded(result) => match result {
                Ok(LoadOutcome::Applied(count)) => {
                    self.state
                        .set_status_message(Some(format!("Loaded {count} Pokemon from your deck")));
                }
                Ok(LoadOutcome::AlreadyLoaded | LoadOutcome::Discarded) => {}
                Err(message) => self.state.set_failure(message),
            },
            AppEvent::Added { name, result } => match result {
                Ok(AddOutcome::Added) => {
                    self.state.set_status_message(Some(format!(
                        "Added {} to your deck",
                        format_name(&name)
                    )));
                }
                Ok(AddOutcome::AlreadyInDeck) => self.show_coordinator_message(),
                Err(message) => self.state.set_failure(format!(
                    "Could not add {}: {message}",
                    format_name(&name)
                )),
            },
            AppEvent::Removed { name, result } => match result {
                Ok(RemoveOutcome::Removed) => {
                    self.state.set_status_message(Some(format!(
                        "Removed {} from your deck",
                        format_name(&name)
                    )));
                }
                Ok(RemoveOutcome::NotInDeck) => self.show_coordinator_message(),
                Err(message) => self.state.set_failure(format!(
                    "Could not remove {}: {message}",
                    format_name(&name)
                )),
            },
            AppEvent::Filtered(result) => match result {
                Ok(FilterOutcome::Applied(_)) => self.show_coordinator_message(),
                Ok(FilterOutcome::Cleared) => self.state.clear_status_message(),
                Ok(FilterOutcome::Stale) => {}
                Err(message) => self.state.set_failure(message),
            },
        }
        let len = self.dispatcher.coordinator().snapshot().view.entries.len();
        self.state.deck.clamp(len);
    }

    fn show_coordinator_message(&mut self) {
        let message = self.dispatcher.coordinator().snapshot().message;
        match message {
            Some(message @ Message::Failure { .. }) => self.state.set_failure(message.text()),
            Some(message) => self.state.set_status_message(Some(message.text())),
            None => {}
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("restoring screen state")?;
    Ok(())
}
