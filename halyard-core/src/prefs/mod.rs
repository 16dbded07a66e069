// ABOUTME: Preference query interface consumed by the reply router
// ABOUTME: Scoped (user, room, broker, plugin, key) values with wildcard matching

pub mod memory;
pub mod sqlite;

pub use memory::MemoryPrefs;
pub use sqlite::SqlitePrefs;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A stored, scoped configuration value.
///
/// Empty scope fields are wildcards: a row with an empty `room` applies to
/// every room. `success` is false when the value came from a default rather
/// than storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub broker: String,
    #[serde(default)]
    pub plugin: String,
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing)]
    pub default: String,
    #[serde(default, skip_serializing)]
    pub success: bool,
}

impl Preference {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            success: true,
            ..Default::default()
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    pub fn broker(mut self, broker: impl Into<String>) -> Self {
        self.broker = broker.into();
        self
    }

    pub fn plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = plugin.into();
        self
    }

    /// How many scope fields are pinned, weighted user > broker > room > plugin
    fn specificity(&self) -> u8 {
        let mut score = 0;
        if !self.user.is_empty() {
            score += 8;
        }
        if !self.broker.is_empty() {
            score += 4;
        }
        if !self.room.is_empty() {
            score += 2;
        }
        if !self.plugin.is_empty() {
            score += 1;
        }
        score
    }
}

/// Scope used to look preferences up. Empty fields are wildcards for `find`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefQuery {
    pub user: String,
    pub room: String,
    pub broker: String,
    pub plugin: String,
    pub key: String,
}

impl PrefQuery {
    pub fn new(
        user: impl Into<String>,
        broker: impl Into<String>,
        room: impl Into<String>,
        plugin: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            room: room.into(),
            broker: broker.into(),
            plugin: plugin.into(),
            key: key.into(),
        }
    }

    /// Same scope, different key
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..self.clone()
        }
    }

    /// Find stored rows for this scope with exactly `key`.
    pub fn find_key(&self, store: &dyn PreferenceStore, key: &str) -> Result<Prefs> {
        store.find(&self.with_key(key))
    }

    /// `find` semantics: every non-empty query field must match exactly.
    pub fn matches(&self, pref: &Preference) -> bool {
        fn field(query: &str, value: &str) -> bool {
            query.is_empty() || query == value
        }
        field(&self.user, &pref.user)
            && field(&self.room, &pref.room)
            && field(&self.broker, &pref.broker)
            && field(&self.plugin, &pref.plugin)
            && field(&self.key, &pref.key)
    }

    /// `get` semantics: the row's key must equal the query key and every
    /// non-empty row scope field must equal the query's.
    pub fn covered_by(&self, pref: &Preference) -> bool {
        fn field(query: &str, value: &str) -> bool {
            value.is_empty() || query == value
        }
        pref.key == self.key
            && field(&self.user, &pref.user)
            && field(&self.room, &pref.room)
            && field(&self.broker, &pref.broker)
            && field(&self.plugin, &pref.plugin)
    }

    /// The value returned by `get` when nothing is stored
    pub fn fallback(&self, default: &str) -> Preference {
        Preference {
            user: self.user.clone(),
            room: self.room.clone(),
            broker: self.broker.clone(),
            plugin: self.plugin.clone(),
            key: self.key.clone(),
            value: default.to_string(),
            default: default.to_string(),
            success: false,
        }
    }
}

/// Pick the most specific row that covers `query`.
pub(crate) fn most_specific<'a, I>(query: &PrefQuery, rows: I) -> Option<Preference>
where
    I: IntoIterator<Item = &'a Preference>,
{
    rows.into_iter()
        .filter(|p| query.covered_by(p))
        .max_by_key(|p| p.specificity())
        .cloned()
}

/// Ordered set of preferences returned from a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefs(Vec<Preference>);

impl Prefs {
    pub fn new(prefs: Vec<Preference>) -> Self {
        Self(prefs)
    }

    /// First row, if any. Absence is a normal outcome.
    pub fn one(&self) -> Option<&Preference> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Preference> {
        self.0.iter()
    }

    pub fn push(&mut self, pref: Preference) {
        self.0.push(pref);
    }

    /// Header and rows suitable for `Event::reply_table`
    pub fn to_table(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let header = ["User", "Room", "Broker", "Plugin", "Key", "Value"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = self
            .0
            .iter()
            .map(|p| {
                vec![
                    p.user.clone(),
                    p.room.clone(),
                    p.broker.clone(),
                    p.plugin.clone(),
                    p.key.clone(),
                    p.value.clone(),
                ]
            })
            .collect();
        (header, rows)
    }
}

impl IntoIterator for Prefs {
    type Item = Preference;
    type IntoIter = std::vec::IntoIter<Preference>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Preference> for Prefs {
    fn from_iter<T: IntoIterator<Item = Preference>>(iter: T) -> Self {
        Prefs(iter.into_iter().collect())
    }
}

/// Lookup interface for scoped preferences.
///
/// The router only ever reads; writing is up to the concrete store.
pub trait PreferenceStore: Send + Sync {
    /// All rows matching `query`, empty query fields acting as wildcards.
    fn find(&self, query: &PrefQuery) -> Result<Prefs>;

    /// The most specific row for `query.key`, or `default` with
    /// `success == false` when none applies.
    fn get(&self, query: &PrefQuery, default: &str) -> Result<Preference>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_matches_wildcards() {
        let pref = Preference::new("reply-via-dm", "true")
            .user("alice")
            .room("ops");
        assert!(PrefQuery::default().matches(&pref));
        assert!(PrefQuery::new("alice", "", "", "", "").matches(&pref));
        assert!(!PrefQuery::new("bob", "", "", "", "").matches(&pref));
        assert!(!PrefQuery::new("alice", "slack", "", "", "").matches(&pref));
    }

    #[test]
    fn test_covered_by_treats_empty_row_fields_as_wildcards() {
        let global = Preference::new("timeout", "5");
        let query = PrefQuery::new("", "console", "ops", "uptime", "timeout");
        assert!(query.covered_by(&global));

        let other_room = Preference::new("timeout", "9").room("dev");
        assert!(!query.covered_by(&other_room));
    }

    #[test]
    fn test_most_specific_prefers_user_over_room() {
        let rows = vec![
            Preference::new("k", "global"),
            Preference::new("k", "room").room("ops"),
            Preference::new("k", "user").user("alice"),
        ];
        let query = PrefQuery::new("alice", "console", "ops", "", "k");
        let best = most_specific(&query, &rows).unwrap();
        assert_eq!(best.value, "user");
    }

    #[test]
    fn test_fallback_is_unsuccessful() {
        let query = PrefQuery::new("u", "b", "r", "p", "k");
        let pref = query.fallback("dflt");
        assert!(!pref.success);
        assert_eq!(pref.value, "dflt");
        assert_eq!(pref.default, "dflt");
        assert_eq!(pref.plugin, "p");
    }

    #[test]
    fn test_prefs_one_on_empty() {
        assert!(Prefs::default().one().is_none());
    }

    #[test]
    fn test_prefs_to_table() {
        let prefs: Prefs = vec![Preference::new("k", "v").room("ops")]
            .into_iter()
            .collect();
        let (header, rows) = prefs.to_table();
        assert_eq!(header.len(), 6);
        assert_eq!(rows, vec![vec!["", "ops", "", "", "k", "v"]]);
    }
}
