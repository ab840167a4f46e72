use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::task::JoinSet;

use crate::config::CatalogOptions;
use crate::deck::Entry;
use crate::error::FetchError;

pub mod normalize;

use normalize::{RawCreature, RawPage};

pub const PAGE_SIZE: u32 = 12;

/// One normalized page of the catalog, in catalog order.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPage {
    pub page: u32,
    pub entries: Vec<Entry>,
    pub total_count: u64,
}

impl CatalogPage {
    pub fn page_count(&self) -> u32 {
        page_count(self.total_count)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count()
    }
}

pub fn page_count(total_count: u64) -> u32 {
    let pages = total_count.div_ceil(u64::from(PAGE_SIZE));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

fn page_offset(page: u32) -> u64 {
    u64::from(page.max(1) - 1) * u64::from(PAGE_SIZE)
}

#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: Arc<str>,
}

impl CatalogClient {
    pub fn new(options: &CatalogOptions) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("pokedeck/", env!("CARGO_PKG_VERSION")))
            .timeout(options.timeout())
            .build()
            .context("building catalog http client")?;
        Ok(Self {
            http,
            base_url: Arc::from(options.base_url.trim_end_matches('/')),
        })
    }

    /// Fetches page `page` (1-based) and the detail record of every item on
    /// it. A failure of any single item fails the whole page.
    pub async fn fetch_page(&self, page: u32) -> Result<CatalogPage, FetchError> {
        let page = page.max(1);
        let url = format!(
            "{}/pokemon?offset={}&limit={}",
            self.base_url,
            page_offset(page),
            PAGE_SIZE
        );
        let listing: RawPage = self.get_json(&url).await?;
        let links = listing.results.unwrap_or_default();

        let mut details = JoinSet::new();
        for (index, link) in links.into_iter().enumerate() {
            let client = self.clone();
            details.spawn(async move {
                let raw: RawCreature = client.get_json(&link.url).await?;
                Ok::<_, FetchError>((index, normalize::normalize(raw)))
            });
        }

        let mut resolved = Vec::with_capacity(details.len());
        while let Some(joined) = details.join_next().await {
            let (index, entry) = joined.map_err(|err| FetchError::Task(err.to_string()))??;
            resolved.push((index, entry));
        }
        resolved.sort_by_key(|(index, _)| *index);

        tracing::debug!(
            page,
            items = resolved.len(),
            total = listing.count,
            "catalog page fetched"
        );
        Ok(CatalogPage {
            page,
            entries: resolved.into_iter().map(|(_, entry)| entry).collect(),
            total_count: listing.count,
        })
    }

    /// Fetches a single record by catalog name or numeric id.
    pub async fn fetch_one(&self, name_or_id: &str) -> Result<Entry, FetchError> {
        let key = name_or_id.trim().to_lowercase();
        let url = format!("{}/pokemon/{}", self.base_url, key);
        let raw: RawCreature = self.get_json(&url).await?;
        Ok(normalize::normalize(raw))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
