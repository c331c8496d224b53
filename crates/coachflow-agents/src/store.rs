//! Entity persistence: records, queries, and scoped transactions

use chrono::{DateTime, Utc};
use coachflow_core::{Error, Focus, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// One persisted entity item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: i64,
    pub user_id: String,
    pub focus: Focus,
    pub parent_id: Option<i64>,
    pub name: String,
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl EntityRecord {
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// `name: k=v, k=v`
    pub fn summary(&self) -> String {
        if self.data.is_empty() {
            return self.name.clone();
        }
        let fields: Vec<String> = self
            .data
            .iter()
            .map(|(k, v)| format!("{}={}", k, render_value(v)))
            .collect();
        format!("{}: {}", self.name, fields.join(", "))
    }
}

pub(crate) fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A record to be inserted.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub user_id: String,
    pub focus: Focus,
    pub parent_id: Option<i64>,
    pub name: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub user_id: String,
    pub focus: Focus,
    /// `None` matches any parent.
    pub parent_id: Option<i64>,
}

impl RecordQuery {
    pub fn new(user_id: impl Into<String>, focus: Focus) -> Self {
        Self {
            user_id: user_id.into(),
            focus,
            parent_id: None,
        }
    }

    pub fn under(mut self, parent_id: Option<i64>) -> Self {
        self.parent_id = parent_id;
        self
    }

    fn matches(&self, r: &EntityRecord) -> bool {
        r.user_id == self.user_id
            && r.focus == self.focus
            && self.parent_id.map_or(true, |p| r.parent_id == Some(p))
    }
}

pub trait EntityStore: Send + Sync {
    fn get(&self, id: i64) -> Result<Option<EntityRecord>>;

    /// Matching records, oldest first.
    fn list(&self, query: &RecordQuery) -> Result<Vec<EntityRecord>>;

    /// Open a transaction. Dropping it without `commit` discards its writes.
    fn begin(&self) -> Box<dyn StoreTransaction + '_>;

    /// The user's current item of `focus`: the newest one under the current
    /// item of its parent focus.
    fn current(&self, user_id: &str, focus: Focus) -> Result<Option<EntityRecord>> {
        let parent_id = match focus.parent() {
            None => None,
            Some(parent) => match self.current(user_id, parent)? {
                Some(p) => Some(p.id),
                None => return Ok(None),
            },
        };
        let query = RecordQuery::new(user_id, focus).under(parent_id);
        Ok(self.list(&query)?.pop())
    }
}

pub trait StoreTransaction {
    fn list(&self, query: &RecordQuery) -> Vec<EntityRecord>;
    fn insert(&mut self, record: NewRecord) -> Result<i64>;
    fn update(&mut self, id: i64, name: String, data: Map<String, Value>) -> Result<()>;
    /// Delete a record and every descendant. Returns the number removed.
    fn delete_cascade(&mut self, id: i64) -> Result<usize>;
    /// Delete every descendant of a record, keeping the record.
    fn delete_children_of(&mut self, id: i64) -> Result<usize>;
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
pub fn with_transaction<T>(
    store: &dyn EntityStore,
    f: impl FnOnce(&mut dyn StoreTransaction) -> Result<T>,
) -> Result<T> {
    let mut tx = store.begin();
    let out = f(tx.as_mut())?;
    tx.commit()?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Tables {
    records: BTreeMap<i64, EntityRecord>,
    next_id: i64,
    version: u64,
}

impl Tables {
    fn descendants(&self, id: i64) -> Vec<i64> {
        let mut out = Vec::new();
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            for r in self.records.values() {
                if r.parent_id == Some(current) {
                    out.push(r.id);
                    frontier.push(r.id);
                }
            }
        }
        out
    }
}

/// Transactional in-memory store. A transaction works on a private copy of
/// the tables and swaps it in on commit, failing if another commit landed
/// first.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn lock(m: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.tables).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record, by id.
    pub fn all(&self) -> Vec<EntityRecord> {
        lock(&self.tables).records.values().cloned().collect()
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, id: i64) -> Result<Option<EntityRecord>> {
        Ok(lock(&self.tables).records.get(&id).cloned())
    }

    fn list(&self, query: &RecordQuery) -> Result<Vec<EntityRecord>> {
        Ok(lock(&self.tables)
            .records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect())
    }

    fn begin(&self) -> Box<dyn StoreTransaction + '_> {
        let working = lock(&self.tables).clone();
        Box::new(MemoryTransaction {
            store: self,
            base_version: working.version,
            working,
            writes: 0,
        })
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    base_version: u64,
    working: Tables,
    writes: usize,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn list(&self, query: &RecordQuery) -> Vec<EntityRecord> {
        self.working
            .records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect()
    }

    fn insert(&mut self, record: NewRecord) -> Result<i64> {
        if let Some(parent_id) = record.parent_id {
            if !self.working.records.contains_key(&parent_id) {
                return Err(Error::store(format!("parent {} does not exist", parent_id)));
            }
        }
        self.working.next_id += 1;
        let id = self.working.next_id;
        self.working.records.insert(
            id,
            EntityRecord {
                id,
                user_id: record.user_id,
                focus: record.focus,
                parent_id: record.parent_id,
                name: record.name,
                data: record.data,
                created_at: Utc::now(),
            },
        );
        self.writes += 1;
        Ok(id)
    }

    fn update(&mut self, id: i64, name: String, data: Map<String, Value>) -> Result<()> {
        let record = self
            .working
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::store(format!("record {} does not exist", id)))?;
        record.name = name;
        record.data = data;
        self.writes += 1;
        Ok(())
    }

    fn delete_cascade(&mut self, id: i64) -> Result<usize> {
        if !self.working.records.contains_key(&id) {
            return Err(Error::store(format!("record {} does not exist", id)));
        }
        let mut doomed = self.working.descendants(id);
        doomed.push(id);
        for d in &doomed {
            self.working.records.remove(d);
        }
        self.writes += 1;
        Ok(doomed.len())
    }

    fn delete_children_of(&mut self, id: i64) -> Result<usize> {
        let doomed = self.working.descendants(id);
        for d in &doomed {
            self.working.records.remove(d);
        }
        if !doomed.is_empty() {
            self.writes += 1;
        }
        Ok(doomed.len())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        if self.writes == 0 {
            return Ok(());
        }
        let mut tables = lock(&self.store.tables);
        if tables.version != self.base_version {
            return Err(Error::store(
                "concurrent modification: transaction started on a stale snapshot",
            ));
        }
        let mut working = self.working;
        working.version = self.base_version + 1;
        debug!(writes = self.writes, version = working.version, "store commit");
        *tables = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new(user: &str, focus: Focus, parent: Option<i64>, name: &str) -> NewRecord {
        NewRecord {
            user_id: user.into(),
            focus,
            parent_id: parent,
            name: name.into(),
            data: Map::new(),
        }
    }

    #[test]
    fn rollback_on_drop() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin();
            tx.insert(new("u", Focus::LongTermPlan, None, "Plan")).unwrap();
        }
        assert!(store.is_empty());
    }

    #[test]
    fn cascade_removes_descendants() {
        let store = MemoryStore::new();
        let (plan, block) = with_transaction(&store, |tx| {
            let plan = tx.insert(new("u", Focus::LongTermPlan, None, "Plan"))?;
            let block = tx.insert(new("u", Focus::TrainingBlock, Some(plan), "Block 1"))?;
            tx.insert(new("u", Focus::WeeklyBlock, Some(block), "Week 1"))?;
            Ok((plan, block))
        })
        .unwrap();
        assert_eq!(store.len(), 3);

        let removed = with_transaction(&store, |tx| tx.delete_children_of(block)).unwrap();
        assert_eq!(removed, 1);
        let removed = with_transaction(&store, |tx| tx.delete_cascade(plan)).unwrap();
        assert_eq!(removed, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn stale_transaction_fails_to_commit() {
        let store = MemoryStore::new();
        let mut first = store.begin();
        let mut second = store.begin();
        first.insert(new("u", Focus::Equipment, None, "Bench")).unwrap();
        second.insert(new("u", Focus::Equipment, None, "Rack")).unwrap();
        first.commit().unwrap();
        assert!(matches!(second.commit(), Err(Error::Store(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn current_follows_the_newest_ancestor_chain() {
        let store = MemoryStore::new();
        with_transaction(&store, |tx| {
            let old = tx.insert(new("u", Focus::LongTermPlan, None, "Old plan"))?;
            tx.insert(new("u", Focus::TrainingBlock, Some(old), "Old block"))?;
            let plan = tx.insert(new("u", Focus::LongTermPlan, None, "New plan"))?;
            tx.insert(new("u", Focus::TrainingBlock, Some(plan), "Block A"))?;
            tx.insert(new("other", Focus::LongTermPlan, None, "Not mine"))?;
            Ok(())
        })
        .unwrap();
        let plan = store.current("u", Focus::LongTermPlan).unwrap().unwrap();
        assert_eq!(plan.name, "New plan");
        let block = store.current("u", Focus::TrainingBlock).unwrap().unwrap();
        assert_eq!(block.name, "Block A");
        assert!(store.current("u", Focus::WeeklyBlock).unwrap().is_none());
        assert!(store.current("nobody", Focus::LongTermPlan).unwrap().is_none());
    }
}
