use super::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database is missing migration '{0}'")]
    MissingHistoric(String),

    #[error("Database has unknown migration '{0}'")]
    ExtraHistoric(String),

    #[error("Migration '{0}' has changed since it was applied")]
    AlteredHistoric(String),

    #[error("Database schema is out of date, run with --upgrade-store")]
    UpdateRequired,
}

/// Checks the applied schema history and applies any newer migrations.
///
/// Applied migrations must match the built-in set exactly, by sequence,
/// name and hash. Pending migrations are only run when `upgrade` is set.
#[cfg_attr(feature = "instrument", instrument(skip(conn)))]
pub fn migrate(conn: &mut rusqlite::Connection, upgrade: bool) -> Result<(), Error> {
    let migrations: &[(isize, &str, &str, &str)] =
        &include!(concat!(env!("OUT_DIR"), "/migrations.rs"));

    let trans = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Exclusive)?;
    trans.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS schema_versions (
            seq_no INTEGER UNIQUE NOT NULL,
            file_name TEXT UNIQUE NOT NULL,
            hash TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
    )?;

    let applied = trans
        .prepare("SELECT seq_no, file_name, hash FROM schema_versions ORDER BY seq_no")?
        .query_map([], |row| {
            Ok((
                row.get::<_, isize>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (i, (seq, file_name, hash)) in applied.iter().enumerate() {
        let Some((expected_seq, expected_name, expected_hash, _)) = migrations.get(i) else {
            return Err(Error::ExtraHistoric(file_name.clone()));
        };
        if seq != expected_seq {
            return Err(if seq > expected_seq {
                Error::MissingHistoric(expected_name.to_string())
            } else {
                Error::ExtraHistoric(file_name.clone())
            });
        }
        if file_name != expected_name || hash != expected_hash {
            return Err(Error::AlteredHistoric(file_name.clone()));
        }
    }

    let pending = &migrations[applied.len()..];
    if !pending.is_empty() {
        if !upgrade {
            return Err(Error::UpdateRequired);
        }
        for (seq, file_name, hash, sql) in pending {
            info!("Applying schema migration '{file_name}'");
            trans.execute_batch(sql)?;
            trans.execute(
                "INSERT INTO schema_versions (seq_no, file_name, hash, timestamp) VALUES (?1, ?2, ?3, datetime('now'))",
                (seq, file_name, hash),
            )?;
        }
    }

    trans.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_needs_upgrade() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        assert!(matches!(
            migrate(&mut conn, false),
            Err(Error::UpdateRequired)
        ));
        migrate(&mut conn, true).unwrap();
        // Idempotent once current
        migrate(&mut conn, false).unwrap();
    }

    #[test]
    fn tampered_history_is_detected() {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        migrate(&mut conn, true).unwrap();
        conn.execute("UPDATE schema_versions SET hash = 'tampered'", [])
            .unwrap();
        assert!(matches!(
            migrate(&mut conn, false),
            Err(Error::AlteredHistoric(_))
        ));
    }
}
