use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The six measured attributes, in canonical display order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StatKey {
    Hp,
    Attack,
    Defense,
    SpecialAttack,
    SpecialDefense,
    Speed,
}

impl StatKey {
    pub const ALL: [StatKey; 6] = [
        StatKey::Hp,
        StatKey::Attack,
        StatKey::Defense,
        StatKey::SpecialAttack,
        StatKey::SpecialDefense,
        StatKey::Speed,
    ];

    pub fn index(self) -> usize {
        match self {
            StatKey::Hp => 0,
            StatKey::Attack => 1,
            StatKey::Defense => 2,
            StatKey::SpecialAttack => 3,
            StatKey::SpecialDefense => 4,
            StatKey::Speed => 5,
        }
    }

    /// Column name in the `pokemon` table.
    pub fn column(self) -> &'static str {
        match self {
            StatKey::Hp => "hp",
            StatKey::Attack => "attack",
            StatKey::Defense => "defense",
            StatKey::SpecialAttack => "special_attack",
            StatKey::SpecialDefense => "special_defense",
            StatKey::Speed => "speed",
        }
    }

    pub fn short_label(self) -> &'static str {
        match self {
            StatKey::Hp => "HP",
            StatKey::Attack => "Atk",
            StatKey::Defense => "Def",
            StatKey::SpecialAttack => "SpA",
            StatKey::SpecialDefense => "SpD",
            StatKey::Speed => "Spe",
        }
    }
}

/// The fixed category vocabulary seeded into the `types` table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Category {
    Normal,
    Fire,
    Water,
    Grass,
    Electric,
    Ice,
    Fighting,
    Poison,
    Ground,
    Flying,
    Psychic,
    Bug,
    Rock,
    Ghost,
    Dragon,
    Dark,
    Steel,
    Fairy,
}

/// Attribute values indexed by [`StatKey`]. Always holds all six.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Attributes([u32; 6]);

impl Attributes {
    pub fn new(values: [u32; 6]) -> Self {
        Self(values)
    }

    pub fn get(&self, key: StatKey) -> u32 {
        self.0[key.index()]
    }

    pub fn set(&mut self, key: StatKey, value: u32) {
        self.0[key.index()] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatKey, u32)> + '_ {
        StatKey::ALL.iter().map(move |key| (*key, self.get(*key)))
    }

    pub fn sum(&self) -> u32 {
        self.0.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub categories: Vec<String>,
    attributes: Attributes,
    total: u32,
}

impl Entry {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        image: impl Into<String>,
        categories: Vec<String>,
        attributes: Attributes,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            image: image.into(),
            categories,
            total: attributes.sum(),
            attributes,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: StatKey) -> u32 {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: StatKey, value: u32) {
        self.attributes.set(key, value);
        self.recompute_total();
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn recompute_total(&mut self) {
        self.total = self.attributes.sum();
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.categories
            .iter()
            .any(|label| label.eq_ignore_ascii_case(category.as_ref()))
    }
}

/// Sort keys understood by both the store and the view pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum SortKey {
    Id,
    Name,
    Type,
    Hp,
    Attack,
    Defense,
    SpecialAttack,
    SpecialDefense,
    Speed,
    Total,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::Name
    }
}

impl SortKey {
    /// Keys offered by the deck sort selector.
    pub const SELECTABLE: [SortKey; 9] = [
        SortKey::Name,
        SortKey::Type,
        SortKey::Hp,
        SortKey::Attack,
        SortKey::Defense,
        SortKey::SpecialAttack,
        SortKey::SpecialDefense,
        SortKey::Speed,
        SortKey::Total,
    ];

    pub fn stat(self) -> Option<StatKey> {
        match self {
            SortKey::Hp => Some(StatKey::Hp),
            SortKey::Attack => Some(StatKey::Attack),
            SortKey::Defense => Some(StatKey::Defense),
            SortKey::SpecialAttack => Some(StatKey::SpecialAttack),
            SortKey::SpecialDefense => Some(StatKey::SpecialDefense),
            SortKey::Speed => Some(StatKey::Speed),
            SortKey::Id | SortKey::Name | SortKey::Type | SortKey::Total => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Id => "Id",
            SortKey::Name => "Name",
            SortKey::Type => "Type",
            SortKey::Hp => "HP",
            SortKey::Attack => "Attack",
            SortKey::Defense => "Defense",
            SortKey::SpecialAttack => "Special Attack",
            SortKey::SpecialDefense => "Special Defense",
            SortKey::Speed => "Speed",
            SortKey::Total => "Total Stats",
        }
    }

    /// Next key in the selector, wrapping around.
    pub fn cycle(self) -> SortKey {
        let position = Self::SELECTABLE
            .iter()
            .position(|key| *key == self)
            .unwrap_or(0);
        Self::SELECTABLE[(position + 1) % Self::SELECTABLE.len()]
    }
}

pub fn format_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
