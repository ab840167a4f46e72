//! Catalog payload schema and the mapping to [`Entry`].
//!
//! Every field the catalog may omit or send as `null` is optional here, so a
//! sparse record still decodes and resolves to defaults.

use serde::Deserialize;

use crate::deck::{Attributes, Entry, StatKey};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawNamed {
    pub name: String,
    pub url: String,
}

/// One page of the `/pokemon` listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPage {
    pub count: u64,
    pub results: Option<Vec<RawNamed>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCreature {
    pub id: i64,
    pub name: String,
    pub sprites: Option<RawSprites>,
    pub types: Option<Vec<RawTypeSlot>>,
    pub stats: Option<Vec<RawStat>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSprites {
    pub front_default: Option<String>,
    pub other: Option<RawOtherSprites>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawOtherSprites {
    #[serde(rename = "official-artwork")]
    pub official_artwork: Option<RawArtwork>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawArtwork {
    pub front_default: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTypeSlot {
    #[serde(rename = "type")]
    pub kind: Option<RawNamed>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStat {
    pub base_stat: Option<u32>,
    pub stat: Option<RawNamed>,
}

pub fn normalize(raw: RawCreature) -> Entry {
    let stats = raw.stats.unwrap_or_default();
    let mut attributes = Attributes::default();
    for key in StatKey::ALL {
        let value = stats
            .iter()
            .find(|stat| {
                stat.stat
                    .as_ref()
                    .is_some_and(|named| named.name == key.as_ref())
            })
            .and_then(|stat| stat.base_stat)
            .unwrap_or(0);
        attributes.set(key, value);
    }

    let image = raw
        .sprites
        .as_ref()
        .and_then(|sprites| {
            sprites
                .other
                .as_ref()
                .and_then(|other| other.official_artwork.as_ref())
                .and_then(|artwork| artwork.front_default.clone())
                .or_else(|| sprites.front_default.clone())
        })
        .unwrap_or_default();

    let categories = raw
        .types
        .unwrap_or_default()
        .into_iter()
        .filter_map(|slot| slot.kind.map(|named| named.name))
        .filter(|name| !name.is_empty())
        .collect();

    Entry::new(raw.id, raw.name, image, categories, attributes)
}
