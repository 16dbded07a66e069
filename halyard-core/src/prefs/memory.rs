// ABOUTME: In-process preference store backed by a Vec behind an RwLock
// ABOUTME: Used for tests and for running without a database file

use super::{most_specific, PrefQuery, Preference, PreferenceStore, Prefs};
use anyhow::Result;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryPrefs {
    rows: RwLock<Vec<Preference>>,
}

impl MemoryPrefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the row with the same scope and key.
    pub fn set(&self, pref: Preference) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| anyhow::anyhow!("Preference lock poisoned: {}", e))?;
        let pref = Preference {
            default: String::new(),
            success: true,
            ..pref
        };
        match rows.iter_mut().find(|p| same_slot(p, &pref)) {
            Some(existing) => existing.value = pref.value,
            None => rows.push(pref),
        }
        Ok(())
    }

    /// Remove the row with the same scope and key. Returns whether one existed.
    pub fn delete(&self, pref: &Preference) -> Result<bool> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| anyhow::anyhow!("Preference lock poisoned: {}", e))?;
        let before = rows.len();
        rows.retain(|p| !same_slot(p, pref));
        Ok(rows.len() != before)
    }
}

fn same_slot(a: &Preference, b: &Preference) -> bool {
    a.user == b.user
        && a.room == b.room
        && a.broker == b.broker
        && a.plugin == b.plugin
        && a.key == b.key
}

impl PreferenceStore for MemoryPrefs {
    fn find(&self, query: &PrefQuery) -> Result<Prefs> {
        let rows = self
            .rows
            .read()
            .map_err(|e| anyhow::anyhow!("Preference lock poisoned: {}", e))?;
        Ok(rows.iter().filter(|p| query.matches(p)).cloned().collect())
    }

    fn get(&self, query: &PrefQuery, default: &str) -> Result<Preference> {
        let rows = self
            .rows
            .read()
            .map_err(|e| anyhow::anyhow!("Preference lock poisoned: {}", e))?;
        Ok(match most_specific(query, rows.iter()) {
            Some(found) => Preference {
                default: default.to_string(),
                ..found
            },
            None => query.fallback(default),
        })
    }
}
