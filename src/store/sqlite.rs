use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value;

use crate::error::StoreError;
use crate::spot::{Category, Locale, LocalizedText, Spot, SpotPatch};
use crate::store::SpotStore;

/// Local spot store backed by a single SQLite table.
pub struct SqliteSpotStore {
    conn: Connection,
}

impl SqliteSpotStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self { conn };
        store.initialize_schema()?;
        store.migrate()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS spots (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                category TEXT,
                year INTEGER,
                country TEXT,
                country_ja TEXT,
                image_url TEXT
            )",
            [],
        )?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        // Locale columns are added lazily so older databases pick up new locales.
        let mut stmt = self.conn.prepare("PRAGMA table_info(spots)")?;
        let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut existing = Vec::new();
        for column in columns {
            existing.push(column?);
        }

        for locale in Locale::ALL {
            for column in [locale.name_column(), locale.description_column()] {
                if !existing.contains(&column) {
                    self.conn
                        .execute(&format!("ALTER TABLE spots ADD COLUMN {column} TEXT"), [])?;
                }
            }
        }
        Ok(())
    }

    /// Inserts a full spot row.
    #[cfg(test)]
    pub fn insert_spot(&self, spot: &Spot) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO spots (id, name, lat, lon, category, year, country, country_ja, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                spot.id,
                spot.name,
                spot.lat,
                spot.lon,
                spot.category.map(Category::as_str),
                spot.year,
                spot.country,
                spot.country_ja,
                spot.image_url
            ],
        )?;
        for (locale, text) in &spot.localized {
            self.conn.execute(
                &format!(
                    "UPDATE spots SET {} = ?1, {} = ?2 WHERE id = ?3",
                    locale.name_column(),
                    locale.description_column()
                ),
                params![text.name, text.description, spot.id],
            )?;
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM spots", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    #[cfg(test)]
    pub fn get_spot(&self, id: &str) -> Result<Option<Spot>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT * FROM spots WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], spot_from_row)?;
        let spot = rows.next().transpose()?;
        Ok(spot)
    }
}

fn spot_from_row(row: &Row<'_>) -> rusqlite::Result<Spot> {
    let mut spot = Spot::new(
        row.get::<_, String>("id")?,
        row.get::<_, String>("name")?,
        row.get("lat")?,
        row.get("lon")?,
    );
    spot.set_stored_category(row.get::<_, Option<String>>("category")?.as_deref());
    spot.year = row.get("year")?;
    spot.country = row.get("country")?;
    spot.country_ja = row.get("country_ja")?;
    spot.image_url = row.get("image_url")?;
    for locale in Locale::ALL {
        let name: Option<String> = row.get(locale.name_column().as_str())?;
        let description: Option<String> = row.get(locale.description_column().as_str())?;
        if name.is_some() || description.is_some() {
            spot.localized
                .insert(locale, LocalizedText { name, description });
        }
    }
    Ok(spot)
}

fn sql_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => SqlValue::Text(text),
        other => SqlValue::Text(other.to_string()),
    }
}

impl SpotStore for SqliteSpotStore {
    fn read_page(&self, offset: usize, limit: usize) -> Result<Vec<Spot>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM spots ORDER BY id ASC LIMIT ?1 OFFSET ?2")?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], spot_from_row)?;
        let mut spots = Vec::new();
        for spot in rows {
            spots.push(spot?);
        }
        Ok(spots)
    }

    fn update_fields(&self, id: &str, patch: &SpotPatch) -> Result<(), StoreError> {
        let columns = patch.columns();
        if columns.is_empty() {
            return Ok(());
        }
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(index, (column, _))| format!("{column} = ?{}", index + 1))
            .collect();
        let sql = format!(
            "UPDATE spots SET {} WHERE id = ?{}",
            assignments.join(", "),
            columns.len() + 1
        );
        let mut values: Vec<SqlValue> = columns
            .into_iter()
            .map(|(_, value)| sql_value(value))
            .collect();
        values.push(SqlValue::Text(id.to_string()));

        let updated = self.conn.execute(&sql, params_from_iter(values))?;
        if updated == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
