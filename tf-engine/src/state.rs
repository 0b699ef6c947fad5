//! Per-invocation state: the work directory and its SQLite-backed store.
//!
//! The store keeps two tables. `info` is a key/value map for metadata the
//! injection side needs back (document name, format, stream dialect,
//! format-specific keys). `styles` is the content-addressed style table:
//! original markup fragments keyed by `(tag, hash)`, where the hash is
//! derived from the fragments themselves so equal markup collapses to one
//! row. SQL stays contained in this module.

use crate::hash::{encode_url64, hash32};
use crate::markers;
use crate::settings::Settings;
use crate::{Error, Result};
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File name of the store inside the work directory.
pub const STORE_FILE: &str = "state.sqlite3";

/// Work-dir state shared by extraction and injection.
pub struct State {
    pub settings: Settings,
    work_dir: PathBuf,
    db: Connection,
    // Lazily loaded read-side copy of the styles table.
    styles: Option<HashMap<(String, String), StyleRecord>>,
}

/// A stored markup fragment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRecord {
    pub otag: String,
    pub ctag: String,
    pub flags: String,
}

impl State {
    /// Open (or create) the store inside `work_dir`.
    pub fn open(work_dir: &Path, settings: Settings, readonly: bool) -> Result<State> {
        let flags = if readonly {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };
        let db = Connection::open_with_flags(work_dir.join(STORE_FILE), flags)
            .map_err(|e| Error::WorkDirUnavailable(format!("{}: {e}", work_dir.display())))?;

        if !readonly {
            db.execute_batch(
                "CREATE TABLE IF NOT EXISTS info (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL);\
                 CREATE TABLE IF NOT EXISTS styles (tag TEXT NOT NULL, hash TEXT NOT NULL, otag TEXT NOT NULL, ctag TEXT NOT NULL, flags TEXT DEFAULT '', PRIMARY KEY (tag, hash));",
            )?;
        }
        let state = State {
            settings,
            work_dir: work_dir.to_path_buf(),
            db,
            styles: None,
        };
        state.verify_schema()?;
        Ok(state)
    }

    fn verify_schema(&self) -> Result<()> {
        for (table, wanted) in [
            ("info", &["key", "value"][..]),
            ("styles", &["tag", "hash", "otag", "ctag", "flags"][..]),
        ] {
            let mut stmt = self
                .db
                .prepare(&format!("PRAGMA table_info({table})"))?;
            let cols: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<std::result::Result<_, _>>()?;
            if cols.is_empty() {
                // Table absent: fine on a fresh store, fatal on a reused one.
                continue;
            }
            if cols != wanted {
                return Err(Error::StoreCorrupt(format!(
                    "table {table} has columns {cols:?}, expected {wanted:?}"
                )));
            }
        }
        Ok(())
    }

    /// The work directory this state lives in.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Path of a file inside the work directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }

    /// Begin a write batch. Every `set_info`/`save_style` until [`commit`]
    /// lands atomically.
    ///
    /// [`commit`]: State::commit
    pub fn begin(&self) -> Result<()> {
        self.db.execute_batch("BEGIN")?;
        Ok(())
    }

    /// Commit the current write batch.
    pub fn commit(&self) -> Result<()> {
        self.db.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Store a metadata key/value pair.
    pub fn set_info(&self, key: &str, value: &str) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO info (key, value) VALUES (?1, ?2)",
            (key, value),
        )?;
        Ok(())
    }

    /// Look up a metadata value.
    pub fn info(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.db.prepare_cached("SELECT value FROM info WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn set_name(&self, val: &str) -> Result<()> {
        self.set_info("name", val)
    }

    pub fn set_format(&self, val: &str) -> Result<()> {
        self.set_info("format", val)
    }

    pub fn set_stream(&self, val: &str) -> Result<()> {
        self.set_info("stream", val)
    }

    pub fn format(&self) -> Result<Option<String>> {
        self.info("format")
    }

    pub fn stream(&self) -> Result<Option<String>> {
        self.info("stream")
    }

    /// Store a style fragment pair and return its hash.
    ///
    /// The hash covers `otag ++ U+E010 ++ ctag` so that an empty opening or
    /// closing fragment still produces a distinct digest. Identical
    /// fragments upsert onto the same `(tag, hash)` row.
    pub fn save_style(&self, tag: &str, otag: &str, ctag: &str, flags: &str) -> Result<String> {
        let mut input = String::with_capacity(otag.len() + ctag.len() + 3);
        input.push_str(otag);
        input.push(markers::HASH_SEP);
        input.push_str(ctag);
        let hash = encode_url64(&hash32(input.as_bytes()).to_le_bytes());

        let mut stmt = self.db.prepare_cached(
            "INSERT OR REPLACE INTO styles (tag, hash, otag, ctag, flags) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        stmt.execute((tag, hash.as_str(), otag, ctag, flags))?;
        Ok(hash)
    }

    /// Look up a stored style fragment pair by `(tag, hash)`.
    ///
    /// The whole table is pulled into memory on first use; injection resolves
    /// every inline marker through this path.
    pub fn style(&mut self, tag: &str, hash: &str) -> Result<Option<&StyleRecord>> {
        if self.styles.is_none() {
            let mut map = HashMap::new();
            let mut stmt = self
                .db
                .prepare("SELECT tag, hash, otag, ctag, flags FROM styles")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let key = (row.get::<_, String>(0)?, row.get::<_, String>(1)?);
                map.insert(
                    key,
                    StyleRecord {
                        otag: row.get(2)?,
                        ctag: row.get(3)?,
                        flags: row.get(4)?,
                    },
                );
            }
            drop(rows);
            drop(stmt);
            self.styles = Some(map);
        }
        Ok(self
            .styles
            .as_ref()
            .unwrap()
            .get(&(tag.to_string(), hash.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn open_state(dir: &Path) -> State {
        State::open(dir, Settings::new(), false).unwrap()
    }

    #[test]
    fn info_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_state(dir.path());
        state.set_info("format", "html").unwrap();
        assert_eq!(state.info("format").unwrap().as_deref(), Some("html"));
        assert_eq!(state.info("missing").unwrap(), None);
        // Upsert replaces.
        state.set_info("format", "tei").unwrap();
        assert_eq!(state.info("format").unwrap().as_deref(), Some("tei"));
    }

    #[test]
    fn style_hash_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_state(dir.path());
        let h1 = state.save_style("b", "<b>", "</b>", "").unwrap();
        let h2 = state.save_style("b", "<b>", "</b>", "").unwrap();
        assert_eq!(h1, h2);
        // The separator makes fragment boundaries part of the digest.
        let h3 = state.save_style("b", "<b></b>", "", "").unwrap();
        assert_ne!(h1, h3);
    }

    #[test]
    fn style_lookup_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let hash = {
            let state = open_state(dir.path());
            state.begin().unwrap();
            let h = state.save_style("i", "<i>", "</i>", "").unwrap();
            state.commit().unwrap();
            h
        };
        let mut ro = State::open(dir.path(), Settings::new(), true).unwrap();
        let rec = ro.style("i", &hash).unwrap().cloned().unwrap();
        assert_eq!(rec.otag, "<i>");
        assert_eq!(rec.ctag, "</i>");
        assert_eq!(rec.flags, "");
        assert!(ro.style("i", "bogus").unwrap().is_none());
        assert!(ro.style("b", &hash).unwrap().is_none());
    }

    #[test]
    fn empty_fragments_are_valid() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = open_state(dir.path());
        let h = state.save_style("P", "<br/>", "", "").unwrap();
        let rec = state.style("P", &h).unwrap().unwrap();
        assert_eq!(rec.otag, "<br/>");
        assert_eq!(rec.ctag, "");
    }
}
