use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use strum::IntoEnumIterator;

use crate::deck::Category;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS pokemon (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            image TEXT NOT NULL DEFAULT '',
            hp INTEGER NOT NULL DEFAULT 0,
            attack INTEGER NOT NULL DEFAULT 0,
            defense INTEGER NOT NULL DEFAULT 0,
            special_attack INTEGER NOT NULL DEFAULT 0,
            special_defense INTEGER NOT NULL DEFAULT 0,
            speed INTEGER NOT NULL DEFAULT 0,
            total INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS types (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS pokemon_types (
            pokemon_id INTEGER NOT NULL,
            type_id INTEGER NOT NULL,
            PRIMARY KEY (pokemon_id, type_id),
            FOREIGN KEY (pokemon_id) REFERENCES pokemon(id) ON DELETE CASCADE,
            FOREIGN KEY (type_id) REFERENCES types(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS pokemon_types_type_idx ON pokemon_types(type_id);
        "#,
    )
    .context("applying schema migrations")?;
    seed_categories(conn)?;
    Ok(())
}

fn seed_categories(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare("INSERT OR IGNORE INTO types (name) VALUES (?1)")
        .context("preparing category seed")?;
    for category in Category::iter() {
        stmt.execute(params![category.as_ref()])
            .with_context(|| format!("seeding category {category}"))?;
    }
    Ok(())
}
