use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use crate::app::App;
use crate::catalog::{CatalogClient, CatalogPage};
use crate::config::AppConfig;
use crate::deck::{
    format_name, AddOutcome, Category, DeckCoordinator, DeckSnapshot, DeckStore, Entry, Liveness,
    Notice, RemoveOutcome, SortKey, StatKey,
};
use crate::storage::{DeckOrder, StorageHandle};

#[derive(Args, Debug, Clone)]
pub struct BrowseArgs {
    /// Catalog page to print (1-based, 12 per page)
    #[arg(long, default_value_t = 1)]
    pub page: u32,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Catalog names or numeric ids
    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    /// Deck entry ids
    #[arg(required = true)]
    pub ids: Vec<i64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DeckArgs {
    /// Case-insensitive substring match on the name
    #[arg(long)]
    pub search: Option<String>,
    /// Only show entries of this type (e.g. water)
    #[arg(long = "type", value_name = "TYPE")]
    pub category: Option<Category>,
    /// Sort key (name, type, hp, attack, defense, special-attack, special-defense, speed, total)
    #[arg(long)]
    pub sort: Option<SortKey>,
    /// Sort descending
    #[arg(long)]
    pub desc: bool,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn browse(config: &AppConfig, args: BrowseArgs) -> Result<()> {
    let client = CatalogClient::new(&config.catalog)?;
    let page = block_on(client.fetch_page(args.page.max(1)))?
        .with_context(|| format!("fetching catalog page {}", args.page))?;
    print!("{}", format_page(&page));
    Ok(())
}

pub fn add(config: &AppConfig, storage: StorageHandle, args: AddArgs) -> Result<()> {
    let client = CatalogClient::new(&config.catalog)?;
    let (fetched, mut failures) = block_on(async {
        let mut fetched = Vec::with_capacity(args.names.len());
        let mut failures = 0usize;
        for name in &args.names {
            match client.fetch_one(name).await {
                Ok(entry) => fetched.push(entry),
                Err(err) => {
                    tracing::warn!(error = ?err, %name, "catalog lookup failed");
                    eprintln!("Could not fetch {name}: {err}");
                    failures += 1;
                }
            }
        }
        (fetched, failures)
    })?;

    let report = add_entries(&storage, fetched)?;
    print!("{}", report.text);
    failures += report.failures;
    if failures > 0 {
        bail!("{failures} of {} additions failed", args.names.len());
    }
    Ok(())
}

pub fn remove(storage: StorageHandle, args: RemoveArgs) -> Result<()> {
    let report = remove_entries(&storage, &args.ids)?;
    print!("{}", report.text);
    if report.failures > 0 {
        bail!("{} of {} removals failed", report.failures, args.ids.len());
    }
    Ok(())
}

pub fn show_deck(config: &AppConfig, storage: StorageHandle, args: DeckArgs) -> Result<()> {
    let output = run_deck(config, &storage, &args)?;
    print!("{output}");
    Ok(())
}

pub fn list_categories(storage: &StorageHandle) -> Result<()> {
    print!("{}", run_categories(storage)?);
    Ok(())
}

/// Per-item results of a batch add or remove.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub text: String,
    pub failures: usize,
}

fn coordinator(storage: &StorageHandle) -> DeckCoordinator<StorageHandle> {
    DeckCoordinator::new(Arc::new(storage.clone()), DeckStore::shared())
}

fn add_entries(storage: &StorageHandle, entries: Vec<Entry>) -> Result<BatchReport> {
    let coordinator = coordinator(storage);
    block_on(async {
        coordinator
            .load_deck(&Liveness::new(), None)
            .await
            .context("loading deck")?;
        let mut report = BatchReport::default();
        for entry in entries {
            let id = entry.id;
            let name = format_name(&entry.name);
            match coordinator.add(entry).await {
                Ok(AddOutcome::Added) => {
                    let _ = writeln!(report.text, "Added {name} (#{id})");
                }
                Ok(AddOutcome::AlreadyInDeck) => {
                    let _ = writeln!(report.text, "{}", Notice::AlreadyInDeck { name });
                }
                Err(err) => {
                    let _ = writeln!(report.text, "Could not add {name}: {err}");
                    report.failures += 1;
                }
            }
        }
        anyhow::Ok(report)
    })?
}

fn remove_entries(storage: &StorageHandle, ids: &[i64]) -> Result<BatchReport> {
    let coordinator = coordinator(storage);
    block_on(async {
        coordinator
            .load_deck(&Liveness::new(), None)
            .await
            .context("loading deck")?;
        let mut report = BatchReport::default();
        for &id in ids {
            let name = coordinator
                .store()
                .read()
                .get(id)
                .map(|entry| format_name(&entry.name));
            match coordinator.remove(id).await {
                Ok(RemoveOutcome::Removed) => {
                    let name = name.unwrap_or_else(|| format!("#{id}"));
                    let _ = writeln!(report.text, "Removed {name} (#{id})");
                }
                Ok(RemoveOutcome::NotInDeck) => {
                    let notice = Notice::NotInDeck {
                        name: format!("#{id}"),
                    };
                    let _ = writeln!(report.text, "{notice}");
                }
                Err(err) => {
                    let _ = writeln!(report.text, "Could not remove #{id}: {err}");
                    report.failures += 1;
                }
            }
        }
        anyhow::Ok(report)
    })?
}

fn run_deck(config: &AppConfig, storage: &StorageHandle, args: &DeckArgs) -> Result<String> {
    let key = args.sort.unwrap_or(config.default_sort.key);
    let ascending = if args.desc {
        false
    } else if args.sort.is_some() {
        true
    } else {
        config.default_sort.ascending()
    };

    let coordinator = coordinator(storage);
    let snapshot = block_on(async {
        coordinator
            .load_deck(&Liveness::new(), Some(DeckOrder { key, ascending }))
            .await
            .context("loading deck")?;
        if let Some(category) = args.category {
            coordinator
                .set_category_filter(Some(category))
                .await
                .with_context(|| format!("filtering deck by {category}"))?;
        }
        coordinator.set_search(args.search.clone().unwrap_or_default());
        coordinator.set_sort(key, ascending);
        anyhow::Ok(coordinator.snapshot())
    })??;

    if args.json {
        let report = DeckReport::from_snapshot(&snapshot);
        let mut out = serde_json::to_string_pretty(&report).context("encoding deck as JSON")?;
        out.push('\n');
        return Ok(out);
    }
    Ok(format_deck(&snapshot))
}

fn run_categories(storage: &StorageHandle) -> Result<String> {
    let categories = storage.list_categories().context("listing categories")?;
    let mut out = String::new();
    for category in categories {
        let _ = writeln!(out, "{category}");
    }
    Ok(out)
}

#[derive(Debug, Serialize)]
struct DeckRow<'a> {
    id: i64,
    name: &'a str,
    categories: &'a [String],
    hp: u32,
    attack: u32,
    defense: u32,
    special_attack: u32,
    special_defense: u32,
    speed: u32,
    total: u32,
}

impl<'a> From<&'a Entry> for DeckRow<'a> {
    fn from(entry: &'a Entry) -> Self {
        Self {
            id: entry.id,
            name: &entry.name,
            categories: &entry.categories,
            hp: entry.attribute(StatKey::Hp),
            attack: entry.attribute(StatKey::Attack),
            defense: entry.attribute(StatKey::Defense),
            special_attack: entry.attribute(StatKey::SpecialAttack),
            special_defense: entry.attribute(StatKey::SpecialDefense),
            speed: entry.attribute(StatKey::Speed),
            total: entry.total(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeckReport<'a> {
    entries: Vec<DeckRow<'a>>,
    notice: Option<String>,
    deck_size: usize,
    average_total: f64,
}

impl<'a> DeckReport<'a> {
    fn from_snapshot(snapshot: &'a DeckSnapshot) -> Self {
        Self {
            entries: snapshot.view.entries.iter().map(DeckRow::from).collect(),
            notice: snapshot.notice().map(|notice| notice.to_string()),
            deck_size: snapshot.summary.count,
            average_total: snapshot.summary.average_total(),
        }
    }
}

fn format_deck(snapshot: &DeckSnapshot) -> String {
    let mut out = String::new();
    if let Some(notice) = snapshot.notice() {
        let _ = writeln!(out, "{notice}");
    }
    if !snapshot.view.entries.is_empty() {
        write_table(&mut out, &snapshot.view.entries);
    }
    let summary = &snapshot.summary;
    if summary.count > 0 {
        let averages: Vec<String> = StatKey::ALL
            .iter()
            .map(|key| format!("{} {}", key.short_label(), summary.display_average(*key)))
            .collect();
        let _ = writeln!(
            out,
            "\n{} Pokemon in deck | avg {} | avg total {}",
            summary.count,
            averages.join("  "),
            summary.display_average_total()
        );
    }
    out
}

fn format_page(page: &CatalogPage) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Page {} of {} ({} Pokemon)",
        page.page,
        page.page_count(),
        page.total_count
    );
    if page.entries.is_empty() {
        out.push_str("(no entries on this page)\n");
    } else {
        write_table(&mut out, &page.entries);
    }
    out
}

fn write_table(out: &mut String, entries: &[Entry]) {
    let _ = write!(out, "{:>5}  {:<14} {:<16}", "#", "Name", "Types");
    for key in StatKey::ALL {
        let _ = write!(out, " {:>4}", key.short_label());
    }
    let _ = writeln!(out, " {:>5}", "Total");
    for entry in entries {
        let types = if entry.categories.is_empty() {
            "-".to_string()
        } else {
            entry.categories.join("/")
        };
        let _ = write!(
            out,
            "{:>5}  {:<14} {:<16}",
            entry.id,
            format_name(&entry.name),
            types
        );
        for key in StatKey::ALL {
            let _ = write!(out, " {:>4}", entry.attribute(key));
        }
        let _ = writeln!(out, " {:>5}", entry.total());
    }
}

/// Drives one async call to completion on a throwaway current-thread runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building async runtime")?;
    Ok(runtime.block_on(future))
}
