use std::cmp::Ordering;
use std::fmt;

use super::entry::{Category, Entry, SortKey, StatKey};

/// User-controlled inputs of the deck view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewQuery {
    pub search: String,
    pub sort_key: SortKey,
    pub ascending: bool,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            sort_key: SortKey::Name,
            ascending: true,
        }
    }
}

/// Informational conditions. None of these represent a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NoSearchMatch { term: String },
    NoCategoryEntries { category: Category },
    DeckEmpty,
    AlreadyInDeck { name: String },
    NotInDeck { name: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NoSearchMatch { term } => write!(f, "No Pokemon match \"{term}\"."),
            Notice::NoCategoryEntries { category } => {
                write!(f, "Your deck has no {category} type Pokemon.")
            }
            Notice::DeckEmpty => {
                write!(f, "Your deck is empty. Please add some Pokemon to your deck.")
            }
            Notice::AlreadyInDeck { name } => write!(f, "{name} is already in your deck."),
            Notice::NotInDeck { name } => write!(f, "{name} is not in your deck."),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedView {
    pub entries: Vec<Entry>,
    pub notice: Option<Notice>,
}

/// Computes the displayed list from scratch.
///
/// The filtered subset, when present, replaces `base` as the source. The search
/// term is trimmed and matched case-insensitively as a substring of the name.
/// Sorting works on a copy; ties always fall back to ascending id.
pub fn derive_view<'a, I>(
    base: I,
    active_subset: Option<&'a [Entry]>,
    query: &ViewQuery,
) -> DerivedView
where
    I: IntoIterator<Item = &'a Entry>,
{
    let needle = query.search.trim().to_lowercase();
    let matches = |entry: &&Entry| needle.is_empty() || entry.name.to_lowercase().contains(&needle);

    let mut entries: Vec<Entry> = match active_subset {
        Some(subset) => subset.iter().filter(matches).cloned().collect(),
        None => base.into_iter().filter(matches).cloned().collect(),
    };

    let notice = if !needle.is_empty() && entries.is_empty() {
        Some(Notice::NoSearchMatch {
            term: query.search.trim().to_string(),
        })
    } else {
        None
    };

    sort_entries(&mut entries, query.sort_key, query.ascending);
    DerivedView { entries, notice }
}

pub fn sort_entries(entries: &mut [Entry], key: SortKey, ascending: bool) {
    entries.sort_by(|a, b| {
        let primary = compare_field(a, b, key, ascending);
        let primary = if ascending { primary } else { primary.reverse() };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}

fn compare_field(a: &Entry, b: &Entry, key: SortKey, ascending: bool) -> Ordering {
    match key {
        SortKey::Id => a.id.cmp(&b.id),
        SortKey::Name => a.name.cmp(&b.name),
        SortKey::Type => type_key(a, ascending).cmp(&type_key(b, ascending)),
        SortKey::Total => a.total().cmp(&b.total()),
        SortKey::Hp
        | SortKey::Attack
        | SortKey::Defense
        | SortKey::SpecialAttack
        | SortKey::SpecialDefense
        | SortKey::Speed => match key.stat() {
            Some(stat) => a.attribute(stat).cmp(&b.attribute(stat)),
            None => Ordering::Equal,
        },
    }
}

// First category in sorted order when ascending, last when descending.
fn type_key(entry: &Entry, ascending: bool) -> Option<&str> {
    let labels = entry.categories.iter().map(String::as_str);
    if ascending {
        labels.min()
    } else {
        labels.max()
    }
}

/// Whole-deck aggregate. Never derived from a filtered or searched view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeckSummary {
    pub count: usize,
    averages: [f64; 6],
    average_total: f64,
}

impl DeckSummary {
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a Entry>,
    {
        let mut count = 0usize;
        let mut sums = [0u64; 6];
        let mut total = 0u64;
        for entry in entries {
            count += 1;
            for (key, value) in entry.attributes().iter() {
                sums[key.index()] += u64::from(value);
            }
            total += u64::from(entry.total());
        }
        if count == 0 {
            return Self::default();
        }

        let divisor = count as f64;
        let mut averages = [0f64; 6];
        for (slot, sum) in averages.iter_mut().zip(sums) {
            *slot = sum as f64 / divisor;
        }
        Self {
            count,
            averages,
            average_total: total as f64 / divisor,
        }
    }

    pub fn average(&self, key: StatKey) -> f64 {
        self.averages[key.index()]
    }

    pub fn average_total(&self) -> f64 {
        self.average_total
    }

    pub fn display_average(&self, key: StatKey) -> String {
        format!("{:.2}", self.average(key))
    }

    pub fn display_average_total(&self) -> String {
        format!("{:.2}", self.average_total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewKey {
    store_revision: u64,
    subset_revision: u64,
    query: ViewQuery,
}

/// Remembers the last derived view and summary, keyed only by their inputs.
#[derive(Debug, Default)]
pub struct ViewCache {
    view_key: Option<ViewKey>,
    view: DerivedView,
    summary_revision: Option<u64>,
    summary: DeckSummary,
}

impl ViewCache {
    pub fn view<'a, I>(
        &mut self,
        store_revision: u64,
        base: I,
        subset_revision: u64,
        active_subset: Option<&'a [Entry]>,
        query: &ViewQuery,
    ) -> &DerivedView
    where
        I: IntoIterator<Item = &'a Entry>,
    {
        let key = ViewKey {
            store_revision,
            subset_revision,
            query: query.clone(),
        };
        if self.view_key.as_ref() != Some(&key) {
            self.view = derive_view(base, active_subset, query);
            self.view_key = Some(key);
        }
        &self.view
    }

    pub fn summary<'a, I>(&mut self, store_revision: u64, base: I) -> &DeckSummary
    where
        I: IntoIterator<Item = &'a Entry>,
    {
        if self.summary_revision != Some(store_revision) {
            self.summary = DeckSummary::from_entries(base);
            self.summary_revision = Some(store_revision);
        }
        &self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::entry::Attributes;

    fn creature(id: i64, name: &str, categories: &[&str], stats: [u32; 6]) -> Entry {
        Entry::new(
            id,
            name,
            "",
            categories.iter().map(|c| c.to_string()).collect(),
            Attributes::new(stats),
        )
    }

    fn with_total(id: i64, total: u32) -> Entry {
        creature(id, &format!("mon-{id}"), &[], [total, 0, 0, 0, 0, 0])
    }

    fn ids(view: &DerivedView) -> Vec<i64> {
        view.entries.iter().map(|e| e.id).collect()
    }

    fn query(search: &str, sort_key: SortKey, ascending: bool) -> ViewQuery {
        ViewQuery {
            search: search.to_string(),
            sort_key,
            ascending,
        }
    }

    fn starters() -> Vec<Entry> {
        vec![
            creature(4, "charmander", &["fire"], [39, 52, 43, 60, 50, 65]),
            creature(6, "charizard", &["fire", "flying"], [78, 84, 78, 109, 85, 100]),
            creature(7, "squirtle", &["water"], [44, 48, 65, 50, 64, 43]),
            creature(1, "bulbasaur", &["grass", "poison"], [45, 49, 49, 65, 65, 45]),
        ]
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let deck = starters();
        let view = derive_view(&deck, None, &query("  CHAR ", SortKey::Name, true));
        assert_eq!(ids(&view), vec![6, 4]);
        assert!(view.notice.is_none());

        let view = derive_view(&deck, None, &query("zard", SortKey::Name, true));
        assert_eq!(ids(&view), vec![6]);
    }

    #[test]
    fn empty_search_result_is_a_notice() {
        let deck = starters();
        let view = derive_view(&deck, None, &query("mew", SortKey::Name, true));
        assert!(view.entries.is_empty());
        assert_eq!(
            view.notice,
            Some(Notice::NoSearchMatch {
                term: "mew".to_string()
            })
        );
    }

    #[test]
    fn total_descending_breaks_ties_by_ascending_id() {
        let deck = vec![with_total(1, 300), with_total(2, 300), with_total(3, 500)];
        let view = derive_view(&deck, None, &query("", SortKey::Total, false));
        assert_eq!(ids(&view), vec![3, 1, 2]);

        let view = derive_view(&deck, None, &query("", SortKey::Total, true));
        assert_eq!(ids(&view), vec![1, 2, 3]);
    }

    #[test]
    fn ties_use_ascending_id_for_every_key() {
        let deck = vec![
            creature(9, "b", &["water"], [10, 10, 10, 10, 10, 10]),
            creature(3, "a", &["water"], [10, 10, 10, 10, 10, 10]),
            creature(5, "c", &["water"], [10, 10, 10, 10, 10, 10]),
        ];
        for key in [
            SortKey::Type,
            SortKey::Hp,
            SortKey::Attack,
            SortKey::Defense,
            SortKey::SpecialAttack,
            SortKey::SpecialDefense,
            SortKey::Speed,
            SortKey::Total,
        ] {
            for ascending in [true, false] {
                let view = derive_view(&deck, None, &query("", key, ascending));
                assert_eq!(ids(&view), vec![3, 5, 9], "key {key} ascending {ascending}");
            }
        }
    }

    #[test]
    fn type_sort_uses_first_or_last_sorted_category() {
        let deck = vec![
            creature(1, "bulbasaur", &["poison", "grass"], [0; 6]),
            creature(6, "charizard", &["fire", "flying"], [0; 6]),
            creature(7, "squirtle", &["water"], [0; 6]),
        ];
        // ascending keys: grass, fire, water
        let view = derive_view(&deck, None, &query("", SortKey::Type, true));
        assert_eq!(ids(&view), vec![6, 1, 7]);
        // descending keys: poison, flying, water
        let view = derive_view(&deck, None, &query("", SortKey::Type, false));
        assert_eq!(ids(&view), vec![7, 1, 6]);
    }

    #[test]
    fn name_sort_orders_lexicographically() {
        let deck = starters();
        let view = derive_view(&deck, None, &query("", SortKey::Name, false));
        assert_eq!(ids(&view), vec![7, 4, 6, 1]);
    }

    #[test]
    fn derivation_leaves_inputs_untouched() {
        let deck = starters();
        let subset = vec![deck[2].clone(), deck[0].clone()];
        let before_deck = deck.clone();
        let before_subset = subset.clone();
        let view = derive_view(&deck, Some(&subset), &query("", SortKey::Id, true));
        assert_eq!(ids(&view), vec![4, 7]);
        assert_eq!(deck, before_deck);
        assert_eq!(subset, before_subset);
    }

    #[test]
    fn empty_deck_summary_is_all_zero() {
        let summary = DeckSummary::from_entries(&[]);
        assert_eq!(summary.count, 0);
        for key in StatKey::ALL {
            assert_eq!(summary.average(key), 0.0);
            assert_eq!(summary.display_average(key), "0.00");
        }
        assert_eq!(summary.average_total(), 0.0);
        assert!(!summary.average_total().is_nan());
    }

    #[test]
    fn single_bulbasaur_summary() {
        let deck = vec![creature(1, "bulbasaur", &["grass", "poison"], [45, 49, 49, 65, 65, 45])];
        assert_eq!(deck[0].total(), 318);
        let summary = DeckSummary::from_entries(&deck);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.display_average(StatKey::Hp), "45.00");
        assert_eq!(summary.display_average_total(), "318.00");
    }

    #[test]
    fn summary_keeps_full_precision() {
        let deck = vec![with_total(1, 1), with_total(2, 2), with_total(3, 2)];
        let summary = DeckSummary::from_entries(&deck);
        assert!((summary.average(StatKey::Hp) - 5.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(summary.display_average(StatKey::Hp), "1.67");
    }

    #[test]
    fn cache_recomputes_only_when_inputs_change() {
        let deck = starters();
        let mut cache = ViewCache::default();
        let q = query("char", SortKey::Name, true);
        let first = cache.view(1, &deck, 0, None, &q).clone();
        assert_eq!(ids(&first), vec![6, 4]);

        // Same key: the stale base is not consulted.
        let cached = cache.view(1, &[], 0, None, &q).clone();
        assert_eq!(cached, first);

        let changed = cache.view(2, &[], 0, None, &q).clone();
        assert!(changed.entries.is_empty());
    }
}
