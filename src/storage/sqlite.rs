use crate::model::{Article, ArticleCandidate, ArticleWithNotes, NewNote, Note, StorageError};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const ARTICLE_COLUMNS: &str = "id, title, link, saved, date_pulled";

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens the database file and creates the schema if needed.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                link TEXT NOT NULL DEFAULT '',
                saved INTEGER NOT NULL DEFAULT 0,
                date_pulled TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            -- position keeps the order notes were attached in
            CREATE TABLE IF NOT EXISTS article_notes (
                position INTEGER PRIMARY KEY AUTOINCREMENT,
                article_id INTEGER NOT NULL REFERENCES articles(id),
                note_id INTEGER NOT NULL REFERENCES notes(id)
            );

            CREATE INDEX IF NOT EXISTS idx_articles_listing ON articles (date_pulled DESC, title ASC);
            CREATE INDEX IF NOT EXISTS idx_article_notes_article ON article_notes (article_id);
            CREATE INDEX IF NOT EXISTS idx_articles_saved ON articles (saved);
            ",
        )?;

        Ok(Self { conn })
    }

    /// Closes the connection, reporting any error SQLite raises on close.
    pub fn close(self) -> Result<(), StorageError> {
        self.conn.close().map_err(|(_, e)| StorageError::from(e))
    }

    pub fn insert_article(&self, candidate: &ArticleCandidate) -> Result<Article, StorageError> {
        self.insert_article_at(candidate, Utc::now())
    }

    pub(crate) fn insert_article_at(
        &self,
        candidate: &ArticleCandidate,
        date_pulled: DateTime<Utc>,
    ) -> Result<Article, StorageError> {
        let link = candidate.link.clone().unwrap_or_default();
        self.conn.execute(
            "INSERT INTO articles (title, link, saved, date_pulled) VALUES (?1, ?2, 0, ?3)",
            params![&candidate.title, &link, format_ts(&date_pulled)],
        )?;

        Ok(Article {
            id: self.conn.last_insert_rowid(),
            title: candidate.title.clone(),
            link,
            saved: false,
            notes: Vec::new(),
            date_pulled,
        })
    }

    /// Newest first, ties broken by title.
    pub fn find_all(&self, limit: u32) -> Result<Vec<Article>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY date_pulled DESC, title ASC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], Self::map_article)?;
        let articles = rows.collect::<Result<Vec<_>, _>>()?;
        self.with_note_ids(articles)
    }

    pub fn find_saved(&self) -> Result<Vec<Article>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE saved = 1 ORDER BY date_pulled DESC, title ASC"
        ))?;
        let rows = stmt.query_map([], Self::map_article)?;
        let articles = rows.collect::<Result<Vec<_>, _>>()?;
        self.with_note_ids(articles)
    }

    pub fn get_article(&self, id: i64) -> Result<Option<ArticleWithNotes>, StorageError> {
        let Some(mut article) = self.find_article(id)? else {
            return Ok(None);
        };
        article.notes = self.note_ids(id)?;

        let mut stmt = self.conn.prepare(
            "SELECT n.id, n.title, n.body, n.created_at
             FROM article_notes an JOIN notes n ON n.id = an.note_id
             WHERE an.article_id = ?1 ORDER BY an.position",
        )?;
        let notes = stmt
            .query_map(params![id], Self::map_note)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ArticleWithNotes { article, notes }))
    }

    /// Returns the updated article, or `None` if the id is unknown.
    pub fn set_saved(&self, id: i64, saved: bool) -> Result<Option<Article>, StorageError> {
        let changed = self.conn.execute(
            "UPDATE articles SET saved = ?2 WHERE id = ?1",
            params![id, saved],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        match self.find_article(id)? {
            Some(mut article) => {
                article.notes = self.note_ids(id)?;
                Ok(Some(article))
            }
            None => Ok(None),
        }
    }

    /// Creates the note and appends it to the article. `None` if the article does not exist.
    pub fn add_note(&self, article_id: i64, note: &NewNote) -> Result<Option<Note>, StorageError> {
        let tx = self.conn.unchecked_transaction()?;

        let exists = tx
            .query_row("SELECT 1 FROM articles WHERE id = ?1", params![article_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO notes (title, body, created_at) VALUES (?1, ?2, ?3)",
            params![&note.title, &note.body, format_ts(&created_at)],
        )?;
        let note_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO article_notes (article_id, note_id) VALUES (?1, ?2)",
            params![article_id, note_id],
        )?;
        tx.commit()?;

        Ok(Some(Note {
            id: note_id,
            title: note.title.clone(),
            body: note.body.clone(),
            created_at,
        }))
    }

    /// Deletes the note and drops it from every article that references it.
    pub fn delete_note(&self, note_id: i64) -> Result<bool, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM article_notes WHERE note_id = ?1", params![note_id])?;
        let removed = tx.execute("DELETE FROM notes WHERE id = ?1", params![note_id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn find_article(&self, id: i64) -> Result<Option<Article>, StorageError> {
        let article = self
            .conn
            .query_row(
                &format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"),
                params![id],
                Self::map_article,
            )
            .optional()?;
        Ok(article)
    }

    fn note_ids(&self, article_id: i64) -> Result<Vec<i64>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT note_id FROM article_notes WHERE article_id = ?1 ORDER BY position")?;
        let ids = stmt
            .query_map(params![article_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn with_note_ids(&self, mut articles: Vec<Article>) -> Result<Vec<Article>, StorageError> {
        for article in articles.iter_mut() {
            article.notes = self.note_ids(article.id)?;
        }
        Ok(articles)
    }

    fn map_article(row: &Row) -> Result<Article, rusqlite::Error> {
        Ok(Article {
            id: row.get(0)?,
            title: row.get(1)?,
            link: row.get(2)?,
            saved: row.get(3)?,
            notes: Vec::new(),
            date_pulled: parse_ts(row, 4)?,
        })
    }

    fn map_note(row: &Row) -> Result<Note, rusqlite::Error> {
        Ok(Note {
            id: row.get(0)?,
            title: row.get(1)?,
            body: row.get(2)?,
            created_at: parse_ts(row, 3)?,
        })
    }
}

// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &Row, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}
