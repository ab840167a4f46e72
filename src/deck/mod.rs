pub mod coordinator;
pub mod entry;
pub mod store;
pub mod view;

pub use coordinator::{
    AddOutcome, DeckCoordinator, DeckSnapshot, EntryPhase, FailureScope, FilterOutcome,
    FilterTicket, Liveness, LoadOutcome, Message, RemoveOutcome,
};
pub use entry::{format_name, Attributes, Category, Entry, SortKey, StatKey};
pub use store::{DeckStore, SharedDeckStore};
pub use view::{derive_view, sort_entries, DeckSummary, DerivedView, Notice, ViewCache, ViewQuery};
