use super::*;
use satnet_bpa::{
    async_trait,
    bundle::{Bundle, Id},
    metadata::BundleStatus,
    storage::{self, Filter, Record},
};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};
use thiserror::Error;

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Corrupt record for bundle {0}: {1}")]
    Corrupt(String, String),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

impl From<Error> for storage::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Storage(e) => e,
            e => storage::Error::Internal(Box::new(e)),
        }
    }
}

struct ConnectionPool {
    path: PathBuf,
    connections: Mutex<Vec<rusqlite::Connection>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl ConnectionPool {
    fn open(&self) -> Result<rusqlite::Connection, Error> {
        let conn = rusqlite::Connection::open_with_flags(
            &self.path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    fn get(&self) -> Result<rusqlite::Connection, Error> {
        if let Some(conn) = self
            .connections
            .lock()
            .trace_expect("Failed to lock mutex")
            .pop()
        {
            Ok(conn)
        } else {
            debug!("Opening new database connection");
            self.open()
        }
    }

    fn put(&self, conn: rusqlite::Connection) {
        self.connections
            .lock()
            .trace_expect("Failed to lock mutex")
            .push(conn)
    }
}

pub struct Storage {
    pool: Arc<ConnectionPool>,
}

fn now_millis() -> i64 {
    millis(time::OffsetDateTime::now_utc())
}

fn millis(t: time::OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(ms: i64) -> time::OffsetDateTime {
    time::OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .unwrap_or(time::OffsetDateTime::UNIX_EPOCH)
}

fn decode_record(id: String, bundle: Vec<u8>, status: String, stored_at: i64) -> Result<Record, Error> {
    let status = status
        .parse::<BundleStatus>()
        .map_err(|e| Error::Corrupt(id.clone(), e))?;
    Ok(Record {
        bundle: serde_json::from_slice(&bundle)?,
        status,
        stored_at: from_millis(stored_at),
    })
}

impl Storage {
    pub fn new(config: &Config, mut upgrade: bool) -> Self {
        std::fs::create_dir_all(&config.db_dir).trace_expect(&format!(
            "Failed to create bundle store directory {}",
            config.db_dir.display()
        ));

        let path = config.db_dir.join(&config.db_name);
        info!("Using database: {}", path.display());

        let mut connection = match rusqlite::Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        ) {
            Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: rusqlite::ffi::ErrorCode::CannotOpen,
                    ..
                },
                _,
            )) => {
                // A new database always takes the full schema
                upgrade = true;
                rusqlite::Connection::open_with_flags(
                    &path,
                    rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                        | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                        | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
            }
            r => r,
        }
        .trace_expect("Failed to open bundle store database");

        migrate::migrate(&mut connection, upgrade)
            .trace_expect("Failed to migrate bundle store database");

        connection
            .execute_batch("PRAGMA journal_mode=WAL")
            .trace_expect("Failed to prepare bundle store database");

        Self {
            pool: Arc::new(ConnectionPool {
                path,
                connections: Mutex::new(vec![connection]),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Runs `f` on the blocking pool with a pooled connection.
    async fn read<F, R>(&self, f: F) -> storage::Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let r = f(&mut conn);
            pool.put(conn);
            r
        })
        .await
        .map_err(Error::from)?
        .map_err(Into::into)
    }

    /// As [`read`](Self::read), with writers serialized so read-check-update
    /// sequences on a single id cannot interleave.
    async fn write<F, R>(&self, f: F) -> storage::Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, Error> + Send + 'static,
        R: Send + 'static,
    {
        let _guard = self.pool.write_lock.lock().await;
        self.read(f).await
    }
}

#[async_trait]
impl storage::BundleStorage for Storage {
    #[cfg_attr(feature = "instrument", instrument(skip_all, fields(bundle = %bundle.id())))]
    async fn store(&self, bundle: &Bundle) -> storage::Result<bool> {
        bundle.validate()?;

        let id = bundle.id().to_string();
        let source = bundle.source().to_string();
        let destination = bundle.destination().to_string();
        let priority = u8::from(bundle.priority());
        let expiry = millis(bundle.expires_at());
        let data = serde_json::to_vec(bundle).map_err(Error::from)?;

        self.write(move |conn| {
            Ok(conn
                .prepare_cached(
                    "INSERT OR IGNORE INTO bundles (id, source, destination, priority, status, stored_at, expiry, bundle)
                    VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7)",
                )?
                .execute((id, source, destination, priority, now_millis(), expiry, data))?
                == 1)
        })
        .await
    }

    #[cfg_attr(feature = "instrument", instrument(skip_all, fields(bundle = %bundle.id())))]
    async fn replace(&self, bundle: &Bundle) -> storage::Result<()> {
        let id = bundle.id();
        let expiry = millis(bundle.expires_at());
        let data = serde_json::to_vec(bundle).map_err(Error::from)?;

        let replaced = self
            .write(move |conn| {
                Ok(conn
                    .prepare_cached("UPDATE bundles SET bundle = ?2, expiry = ?3 WHERE id = ?1")?
                    .execute((id.to_string(), data, expiry))?)
            })
            .await?;

        if replaced == 0 {
            Err(storage::Error::NotFound(id))
        } else {
            Ok(())
        }
    }

    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    async fn retrieve(&self, id: &Id) -> storage::Result<Bundle> {
        let key = id.to_string();
        let data = self
            .read(move |conn| {
                Ok(conn
                    .prepare_cached("SELECT bundle FROM bundles WHERE id = ?1 LIMIT 1")?
                    .query_row((key,), |row| row.get::<_, Vec<u8>>(0))
                    .optional()?)
            })
            .await?
            .ok_or(storage::Error::NotFound(*id))?;

        Ok(serde_json::from_slice(&data).map_err(Error::from)?)
    }

    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    async fn delete(&self, id: &Id) -> storage::Result<()> {
        let key = id.to_string();
        let deleted = self
            .write(move |conn| {
                Ok(conn
                    .prepare_cached("DELETE FROM bundles WHERE id = ?1")?
                    .execute((key,))?)
            })
            .await?;

        if deleted == 0 {
            Err(storage::Error::NotFound(*id))
        } else {
            Ok(())
        }
    }

    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    async fn list(&self, filter: &Filter) -> storage::Result<Vec<Bundle>> {
        // Narrow by the indexed columns here, the filter finishes the job
        let mut sql = String::from("SELECT id, bundle, status, stored_at FROM bundles WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();
        if let Some(destination) = &filter.destination {
            params.push(Box::new(destination.clone()));
            sql.push_str(&format!(" AND destination = ?{}", params.len()));
        }
        if let Some(source) = &filter.source {
            params.push(Box::new(source.clone()));
            sql.push_str(&format!(" AND source = ?{}", params.len()));
        }
        if let Some(status) = filter.status {
            params.push(Box::new(status.as_str()));
            sql.push_str(&format!(" AND status = ?{}", params.len()));
        }
        if let Some(min_priority) = filter.min_priority {
            params.push(Box::new(u8::from(min_priority)));
            sql.push_str(&format!(" AND priority >= ?{}", params.len()));
        }

        let records = self
            .read(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Vec<u8>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(id, bundle, status, stored_at)| {
                        decode_record(id, bundle, status, stored_at)
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .await?;

        Ok(filter.apply(records))
    }

    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    async fn update_status(&self, id: &Id, status: BundleStatus) -> storage::Result<()> {
        let id = *id;
        self.write(move |conn| {
            let trans = conn.transaction()?;
            let current = trans
                .prepare_cached("SELECT status FROM bundles WHERE id = ?1 LIMIT 1")?
                .query_row((id.to_string(),), |row| row.get::<_, String>(0))
                .optional()?
                .ok_or(storage::Error::NotFound(id))?;
            let current = current
                .parse::<BundleStatus>()
                .map_err(|e| Error::Corrupt(id.to_string(), e))?;

            storage::check_transition(id, current, status)?;
            if current != status {
                trans
                    .prepare_cached("UPDATE bundles SET status = ?1 WHERE id = ?2")?
                    .execute((status.as_str(), id.to_string()))?;
            }
            trans.commit()?;
            Ok(())
        })
        .await
    }

    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    async fn status(&self, id: &Id) -> storage::Result<BundleStatus> {
        let key = id.to_string();
        let status = self
            .read(move |conn| {
                Ok(conn
                    .prepare_cached("SELECT status FROM bundles WHERE id = ?1 LIMIT 1")?
                    .query_row((key,), |row| row.get::<_, String>(0))
                    .optional()?)
            })
            .await?
            .ok_or(storage::Error::NotFound(*id))?;

        Ok(status
            .parse()
            .map_err(|e| Error::Corrupt(id.to_string(), e))?)
    }

    async fn count(&self) -> storage::Result<usize> {
        self.read(|conn| {
            Ok(conn
                .prepare_cached("SELECT count(*) FROM bundles")?
                .query_row([], |row| row.get::<_, i64>(0))? as usize)
        })
        .await
    }

    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    async fn purge_expired(&self) -> storage::Result<usize> {
        let purged = self
            .write(|conn| {
                Ok(conn
                    .prepare_cached("DELETE FROM bundles WHERE expiry < ?1")?
                    .execute((now_millis(),))?)
            })
            .await?;
        if purged > 0 {
            debug!("Purged {purged} expired bundles");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satnet_bpa::storage::BundleStorage;

    fn open(dir: &tempfile::TempDir, upgrade: bool) -> Storage {
        Storage::new(
            &Config {
                db_dir: dir.path().to_path_buf(),
                db_name: "test.db".into(),
            },
            upgrade,
        )
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = Bundle::builder("dtn://a/", "dtn://b/")
            .payload("persist me")
            .build();

        {
            let store = open(&dir, false);
            assert!(store.store(&bundle).await.unwrap());
            store
                .update_status(&bundle.id(), BundleStatus::InTransit)
                .await
                .unwrap();
        }

        let store = open(&dir, false);
        let copy = store.retrieve(&bundle.id()).await.unwrap();
        assert_eq!(format!("{copy:?}"), format!("{bundle:?}"));
        assert_eq!(
            store.status(&bundle.id()).await.unwrap(),
            BundleStatus::InTransit
        );
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, true);

        let short = Bundle::builder("dtn://a/", "dtn://b/")
            .lifetime(time::Duration::milliseconds(20))
            .build();
        let long = Bundle::create("dtn://a/", "dtn://b/", "x");
        store.store(&short).await.unwrap();
        store.store(&long).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.retrieve(&long.id()).await.is_ok());
    }

    #[tokio::test]
    async fn list_prefilters_in_sql() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, true);

        let bulk = Bundle::builder("dtn://a/", "dtn://b/")
            .priority(satnet_bpa::bundle::Priority::Bulk)
            .build();
        let expedited = Bundle::builder("dtn://a/", "dtn://b/")
            .priority(satnet_bpa::bundle::Priority::Expedited)
            .build();
        let elsewhere = Bundle::create("dtn://a/", "dtn://c/", "x");
        for b in [&bulk, &expedited, &elsewhere] {
            store.store(b).await.unwrap();
        }

        let listed = store
            .list(&Filter {
                destination: Some("dtn://b/".into()),
                min_priority: Some(satnet_bpa::bundle::Priority::Normal),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), expedited.id());
    }
}
