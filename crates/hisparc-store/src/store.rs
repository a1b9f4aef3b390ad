use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use hisparc_core::store::ZENITH_TOLERANCE;
use hisparc_core::{
    Coincidence, DensityCut, EventFilter, Observable, PulseStore, ReconstructedEvent,
    Reconstruction, ReconstructionStore, Shower, ShowerError, ShowerResult, ShowerStore,
};

use crate::schema::init_db;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(path: &Path) -> ShowerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ShowerError::Database(format!("cannot create db directory: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| ShowerError::Database(format!("cannot open database: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| ShowerError::Database(e.to_string()))?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> ShowerResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ShowerError::Database(format!("cannot open in-memory db: {e}")))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| ShowerError::Database(e.to_string()))?;
        init_db(&conn)?;
        Ok(Self { conn })
    }
}

fn db_err(e: rusqlite::Error) -> ShowerError {
    ShowerError::Database(e.to_string())
}

/// SQLite stores NaN as NULL.
fn get_f64(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<f64> {
    Ok(row.get::<_, Option<f64>>(idx)?.unwrap_or(f64::NAN))
}

fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |l| l as i64)
}

// ---------------------------------------------------------------------------
// Shower helpers
// ---------------------------------------------------------------------------

fn row_to_observable(row: &rusqlite::Row) -> rusqlite::Result<Observable> {
    Ok(Observable {
        id: row.get(0)?,
        t: [get_f64(row, 1)?, get_f64(row, 2)?, get_f64(row, 3)?, get_f64(row, 4)?],
        n: [row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
        r: row.get(9)?,
        phi: row.get(10)?,
        alpha: row.get(11)?,
    })
}

fn row_to_coincidence(row: &rusqlite::Row) -> rusqlite::Result<Coincidence> {
    Ok(Coincidence {
        id: row.get(0)?,
        r: row.get(1)?,
        phi: row.get(2)?,
        alpha: row.get(3)?,
    })
}

fn write_shower(conn: &Connection, simulation: &str, name: &str) -> ShowerResult<i64> {
    conn.execute(
        "INSERT INTO showers (simulation, name) VALUES (?1, ?2)",
        params![simulation, name],
    )
    .map_err(db_err)?;
    Ok(conn.last_insert_rowid())
}

fn write_observables(conn: &Connection, shower_id: i64, events: &[Observable]) -> ShowerResult<()> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO observables
             (shower_id, id, t1, t2, t3, t4, n1, n2, n3, n4, r, phi, alpha)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .map_err(db_err)?;
    for e in events {
        stmt.execute(params![
            shower_id, e.id, e.t[0], e.t[1], e.t[2], e.t[3], e.n[0], e.n[1], e.n[2], e.n[3], e.r,
            e.phi, e.alpha,
        ])
        .map_err(db_err)?;
    }
    Ok(())
}

fn write_coincidences(
    conn: &Connection,
    shower_id: i64,
    events: &[Coincidence],
) -> ShowerResult<()> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO coincidences (shower_id, id, r, phi, alpha)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(db_err)?;
    for e in events {
        stmt.execute(params![shower_id, e.id, e.r, e.phi, e.alpha])
            .map_err(db_err)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ShowerStore
// ---------------------------------------------------------------------------

impl ShowerStore for SqliteStore {
    fn add_shower(&self, simulation: &str, name: &str) -> ShowerResult<i64> {
        write_shower(&self.conn, simulation, name)
    }

    fn insert_observables(&self, shower_id: i64, events: &[Observable]) -> ShowerResult<usize> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        write_observables(&tx, shower_id, events)?;
        tx.commit().map_err(db_err)?;
        Ok(events.len())
    }

    fn insert_coincidences(&self, shower_id: i64, events: &[Coincidence]) -> ShowerResult<usize> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        write_coincidences(&tx, shower_id, events)?;
        tx.commit().map_err(db_err)?;
        Ok(events.len())
    }

    fn import_shower(
        &self,
        simulation: &str,
        name: &str,
        observables: &[Observable],
        coincidences: &[Coincidence],
    ) -> ShowerResult<i64> {
        // Dropping the transaction on error rolls back the shower row too.
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        let id = write_shower(&tx, simulation, name)?;
        write_observables(&tx, id, observables)?;
        write_coincidences(&tx, id, coincidences)?;
        tx.commit().map_err(db_err)?;
        debug!(simulation, shower = name, events = observables.len(), "imported shower");
        Ok(id)
    }

    fn list_simulations(&self) -> ShowerResult<Vec<(String, usize)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT simulation, COUNT(*) FROM showers GROUP BY simulation ORDER BY simulation",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(db_err)?);
        }
        Ok(results)
    }

    fn list_showers(&self, simulation: &str) -> ShowerResult<Vec<Shower>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, simulation, name FROM showers WHERE simulation = ?1 ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![simulation], |row| {
                Ok(Shower {
                    id: row.get(0)?,
                    simulation: row.get(1)?,
                    name: row.get(2)?,
                })
            })
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(db_err)?);
        }
        Ok(results)
    }

    fn observables(&self, shower_id: i64, limit: Option<usize>) -> ShowerResult<Vec<Observable>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, t1, t2, t3, t4, n1, n2, n3, n4, r, phi, alpha
                 FROM observables WHERE shower_id = ?1 ORDER BY rowid LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![shower_id, sql_limit(limit)], row_to_observable)
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(db_err)?);
        }
        Ok(results)
    }

    fn coincidences(&self, shower_id: i64, limit: Option<usize>) -> ShowerResult<Vec<Coincidence>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, r, phi, alpha
                 FROM coincidences WHERE shower_id = ?1 ORDER BY rowid LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![shower_id, sql_limit(limit)], row_to_coincidence)
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(db_err)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Reconstruction helpers
// ---------------------------------------------------------------------------

const EVENT_COLS: &str = "r, phi, alpha, t1, t2, t3, t4, n1, n2, n3, n4, \
                          sim_theta, sim_phi, r_theta, r_phi, D, size, bin, bin_r";

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_reconstruction(row: &rusqlite::Row) -> rusqlite::Result<Reconstruction> {
    let created: String = row.get(2)?;
    Ok(Reconstruction {
        name: row.get(0)?,
        description: row.get(1)?,
        created_at: parse_dt(&created),
    })
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<ReconstructedEvent> {
    Ok(ReconstructedEvent {
        r: get_f64(row, 0)?,
        phi: get_f64(row, 1)?,
        alpha: get_f64(row, 2)?,
        t: [get_f64(row, 3)?, get_f64(row, 4)?, get_f64(row, 5)?, get_f64(row, 6)?],
        n: [row.get(7)?, row.get(8)?, row.get(9)?, row.get(10)?],
        sim_theta: row.get(11)?,
        sim_phi: get_f64(row, 12)?,
        r_theta: row.get(13)?,
        r_phi: row.get(14)?,
        density: row.get(15)?,
        size: row.get(16)?,
        bin: row.get(17)?,
        bin_r: row.get(18)?,
    })
}

/// WHERE clause over `reconstructed_events`; placeholder 1 is the table name.
#[derive(Default)]
struct Clause {
    parts: Vec<String>,
    values: Vec<Box<dyn rusqlite::types::ToSql>>,
}

impl Clause {
    fn bind(&mut self, value: impl rusqlite::types::ToSql + 'static) -> String {
        self.values.push(Box::new(value));
        format!("?{}", self.values.len() + 1)
    }

    fn from_filter(filter: &EventFilter) -> Self {
        let mut c = Self::default();
        c.parts.push("reconstruction = ?1".into());

        match filter.density {
            Some(DensityCut::Exactly(d)) => {
                let p = c.bind(d);
                c.parts.push(format!("D = {p}"));
            }
            Some(DensityCut::AtLeast(d)) => {
                let p = c.bind(d);
                c.parts.push(format!("D >= {p}"));
            }
            None => {}
        }
        if let Some(theta) = filter.sim_theta {
            let (p, tol) = (c.bind(theta), c.bind(ZENITH_TOLERANCE));
            c.parts.push(format!("ABS(sim_theta - {p}) < {tol}"));
        }
        if let Some(size) = filter.size {
            let p = c.bind(size);
            c.parts.push(format!("size = {p}"));
        }
        if let Some(bin) = filter.bin {
            let p = c.bind(bin);
            c.parts.push(format!("bin = {p}"));
        }
        if let Some(bin_r) = filter.bin_r {
            let p = c.bind(bin_r);
            c.parts.push(format!("bin_r = {p}"));
        }
        if let Some((lo, hi)) = filter.core_distance {
            let (lo, hi) = (c.bind(lo), c.bind(hi));
            c.parts.push(format!("r > {lo} AND r <= {hi}"));
        }
        c
    }
}

// ---------------------------------------------------------------------------
// ReconstructionStore
// ---------------------------------------------------------------------------

impl ReconstructionStore for SqliteStore {
    fn has_reconstruction(&self, name: &str) -> ShowerResult<bool> {
        Ok(self.get_reconstruction(name)?.is_some())
    }

    fn get_reconstruction(&self, name: &str) -> ShowerResult<Option<Reconstruction>> {
        self.conn
            .query_row(
                "SELECT name, description, created_at FROM reconstructions WHERE name = ?1",
                params![name],
                row_to_reconstruction,
            )
            .optional()
            .map_err(db_err)
    }

    fn list_reconstructions(&self) -> ShowerResult<Vec<Reconstruction>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, description, created_at FROM reconstructions ORDER BY name")
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_reconstruction).map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(db_err)?);
        }
        Ok(results)
    }

    fn create_reconstruction(&self, name: &str, description: &str) -> ShowerResult<()> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        let dropped = tx
            .execute(
                "DELETE FROM reconstructed_events WHERE reconstruction = ?1",
                params![name],
            )
            .map_err(db_err)?;
        tx.execute("DELETE FROM reconstructions WHERE name = ?1", params![name])
            .map_err(db_err)?;
        tx.execute(
            "INSERT INTO reconstructions (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        if dropped > 0 {
            debug!(reconstruction = name, dropped, "replaced reconstruction table");
        }
        Ok(())
    }

    fn delete_reconstruction(&self, name: &str) -> ShowerResult<bool> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        let dropped = tx
            .execute(
                "DELETE FROM reconstructed_events WHERE reconstruction = ?1",
                params![name],
            )
            .map_err(db_err)?;
        let existed = tx
            .execute("DELETE FROM reconstructions WHERE name = ?1", params![name])
            .map_err(db_err)?
            > 0;
        tx.commit().map_err(db_err)?;
        debug!(reconstruction = name, dropped, "deleted reconstruction table");
        Ok(existed)
    }

    fn append_events(&self, name: &str, events: &[ReconstructedEvent]) -> ShowerResult<usize> {
        if !self.has_reconstruction(name)? {
            return Err(ShowerError::NotFound(name.to_string()));
        }

        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare_cached(&format!(
                    "INSERT INTO reconstructed_events (reconstruction, {EVENT_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                             ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
                ))
                .map_err(db_err)?;
            for e in events {
                stmt.execute(params![
                    name,
                    e.r,
                    e.phi,
                    e.alpha,
                    e.t[0],
                    e.t[1],
                    e.t[2],
                    e.t[3],
                    e.n[0],
                    e.n[1],
                    e.n[2],
                    e.n[3],
                    e.sim_theta,
                    e.sim_phi,
                    e.r_theta,
                    e.r_phi,
                    e.density,
                    e.size,
                    e.bin,
                    e.bin_r,
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(events.len())
    }

    fn read_events(&self, name: &str, filter: &EventFilter) -> ShowerResult<Vec<ReconstructedEvent>> {
        if !self.has_reconstruction(name)? {
            return Err(ShowerError::NotFound(name.to_string()));
        }

        let clause = Clause::from_filter(filter);
        let query = format!(
            "SELECT {EVENT_COLS} FROM reconstructed_events WHERE {} ORDER BY rowid",
            clause.parts.join(" AND ")
        );

        let mut stmt = self.conn.prepare(&query).map_err(db_err)?;
        let mut params_ref: Vec<&dyn rusqlite::types::ToSql> = vec![&name];
        params_ref.extend(clause.values.iter().map(|p| p.as_ref()));
        let rows = stmt
            .query_map(params_ref.as_slice(), row_to_event)
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(db_err)?);
        }
        Ok(results)
    }

    fn count_events(&self, name: &str) -> ShowerResult<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM reconstructed_events WHERE reconstruction = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

// ---------------------------------------------------------------------------
// PulseStore
// ---------------------------------------------------------------------------

impl PulseStore for SqliteStore {
    fn insert_pulse_integrals(&self, station: u32, integrals: &[f64]) -> ShowerResult<usize> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare_cached("INSERT INTO pulse_integrals (station, integral) VALUES (?1, ?2)")
                .map_err(db_err)?;
            for v in integrals {
                stmt.execute(params![station, v]).map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(integrals.len())
    }

    fn pulse_integrals(&self, station: u32) -> ShowerResult<Vec<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT integral FROM pulse_integrals WHERE station = ?1 ORDER BY rowid")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![station], |row| row.get(0))
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(db_err)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn test_store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    fn make_observable(id: u32, n: u16) -> Observable {
        Observable {
            id,
            t: [100.0, 101.0, 95.5, -999.0],
            n: [n, 1, n, n],
            r: 12.5,
            phi: 0.3,
            alpha: -1.2,
        }
    }

    fn make_event(density: u16, sim_theta: f64, r: f64) -> ReconstructedEvent {
        ReconstructedEvent {
            r,
            phi: 0.1,
            alpha: 0.2,
            t: [1.0, 2.0, 3.0, 4.0],
            n: [density, 0, density, density],
            sim_theta,
            sim_phi: 0.5,
            r_theta: sim_theta + 0.01,
            r_phi: 0.49,
            density,
            size: 10,
            bin: 0.0,
            bin_r: false,
        }
    }

    // === ShowerStore tests ===

    #[test]
    fn test_add_and_list_showers() {
        let store = test_store();
        let a = store.add_shower("zenith_0", "shower_0").unwrap();
        let b = store.add_shower("zenith_0", "shower_1").unwrap();
        store.add_shower("zenith_35", "shower_0").unwrap();
        assert_ne!(a, b);

        let showers = store.list_showers("zenith_0").unwrap();
        assert_eq!(showers.len(), 2);
        assert_eq!(showers[0].name, "shower_0");

        let sims = store.list_simulations().unwrap();
        assert_eq!(sims, vec![("zenith_0".to_string(), 2), ("zenith_35".to_string(), 1)]);
    }

    #[test]
    fn test_duplicate_shower_rejected() {
        let store = test_store();
        store.add_shower("zenith_0", "shower_0").unwrap();
        assert!(matches!(
            store.add_shower("zenith_0", "shower_0"),
            Err(ShowerError::Database(_))
        ));
    }

    #[test]
    fn test_observables_roundtrip_in_order() {
        let store = test_store();
        let id = store.add_shower("zenith_0", "shower_0").unwrap();
        let events: Vec<Observable> = (0..5).map(|i| make_observable(4 - i, 3)).collect();
        assert_eq!(store.insert_observables(id, &events).unwrap(), 5);

        let back = store.observables(id, None).unwrap();
        assert_eq!(back, events);
        assert_eq!(store.observables(id, Some(2)).unwrap().len(), 2);
        assert_eq!(back[0].id, 4);
    }

    #[test]
    fn test_coincidences_parallel_to_observables() {
        let store = test_store();
        let id = store.add_shower("zenith_0", "shower_0").unwrap();
        let coincidences = vec![
            Coincidence { id: 0, r: 5.0, phi: 0.1, alpha: 1.0 },
            Coincidence { id: 1, r: 50.0, phi: -0.1, alpha: -2.0 },
        ];
        store.insert_coincidences(id, &coincidences).unwrap();
        assert_eq!(store.coincidences(id, None).unwrap(), coincidences);
        assert!(store.coincidences(id + 1, None).unwrap().is_empty());
    }

    #[test]
    fn test_nan_time_reads_back_as_nan() {
        let store = test_store();
        let id = store.add_shower("zenith_0", "shower_0").unwrap();
        let mut obs = make_observable(0, 1);
        obs.t[1] = f64::NAN;
        store.insert_observables(id, &[obs]).unwrap();
        let back = store.observables(id, None).unwrap();
        assert!(back[0].t[1].is_nan());
    }

    // === ReconstructionStore tests ===

    #[test]
    fn test_create_and_get_reconstruction() {
        let store = test_store();
        assert!(!store.has_reconstruction("full").unwrap());
        store.create_reconstruction("full", "Reconstruction data").unwrap();

        let meta = store.get_reconstruction("full").unwrap().unwrap();
        assert_eq!(meta.description, "Reconstruction data");
        assert_eq!(store.list_reconstructions().unwrap().len(), 1);
        assert_eq!(store.count_events("full").unwrap(), 0);
    }

    #[test]
    fn test_append_requires_table() {
        let store = test_store();
        let result = store.append_events("missing", &[make_event(1, 0.0, 10.0)]);
        assert!(matches!(result, Err(ShowerError::NotFound(_))));
        assert!(matches!(
            store.read_events("missing", &EventFilter::new()),
            Err(ShowerError::NotFound(_))
        ));
    }

    #[test]
    fn test_recreate_discards_rows() {
        let store = test_store();
        store.create_reconstruction("full", "first").unwrap();
        store
            .append_events("full", &[make_event(1, 0.0, 10.0), make_event(2, 0.0, 10.0)])
            .unwrap();
        store.create_reconstruction("other", "untouched").unwrap();
        store.append_events("other", &[make_event(1, 0.0, 10.0)]).unwrap();

        store.create_reconstruction("full", "second").unwrap();
        assert_eq!(store.count_events("full").unwrap(), 0);
        assert_eq!(store.count_events("other").unwrap(), 1);
        let meta = store.get_reconstruction("full").unwrap().unwrap();
        assert_eq!(meta.description, "second");
    }

    #[test]
    fn test_events_roundtrip() {
        let store = test_store();
        store.create_reconstruction("full", "").unwrap();
        let mut binned = make_event(3, PI / 8.0, 42.0);
        binned.bin = 2.5;
        binned.bin_r = true;
        binned.size = 20;
        let events = vec![make_event(1, 0.0, 10.0), binned];
        assert_eq!(store.append_events("full", &events).unwrap(), 2);
        assert_eq!(store.read_events("full", &EventFilter::new()).unwrap(), events);
    }

    #[test]
    fn test_read_events_filters() {
        let store = test_store();
        store.create_reconstruction("full", "").unwrap();
        // Zenith stored as a single-precision value, as the simulations do.
        let theta32 = (PI / 8.0) as f32 as f64;
        let mut events = vec![
            make_event(1, theta32, 10.0),
            make_event(2, theta32, 10.0),
            make_event(2, theta32, 150.0),
            make_event(3, 0.0, 10.0),
        ];
        events[1].bin = 5.0;
        events[1].bin_r = true;
        store.append_events("full", &events).unwrap();

        let exactly_two = EventFilter::new().density(DensityCut::Exactly(2));
        assert_eq!(store.read_events("full", &exactly_two).unwrap().len(), 2);

        let at_least_two = EventFilter::new().density(DensityCut::AtLeast(2));
        assert_eq!(store.read_events("full", &at_least_two).unwrap().len(), 3);

        let zenith = EventFilter::new().zenith(PI / 8.0);
        assert_eq!(store.read_events("full", &zenith).unwrap().len(), 3);

        let unbinned = EventFilter::new().zenith(PI / 8.0).bin(0.0).randomized(false);
        assert_eq!(store.read_events("full", &unbinned).unwrap().len(), 2);

        let near = EventFilter::new()
            .density(DensityCut::Exactly(2))
            .core_distance(0.0, 100.0);
        let rows = store.read_events("full", &near).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bin, 5.0);

        let size = EventFilter::new().size(20);
        assert!(store.read_events("full", &size).unwrap().is_empty());
    }

    #[test]
    fn test_sql_filter_agrees_with_matches() {
        let store = test_store();
        store.create_reconstruction("full", "").unwrap();
        let events: Vec<ReconstructedEvent> = (0..40)
            .map(|i| {
                let theta = if i % 2 == 0 { 0.0 } else { PI / 8.0 };
                let mut e = make_event((i % 5) as u16, theta, i as f64 * 5.0);
                e.bin = [0.0, 1.0, 2.5][i % 3];
                e
            })
            .collect();
        store.append_events("full", &events).unwrap();

        let filter = EventFilter::new()
            .density(DensityCut::AtLeast(2))
            .zenith(PI / 8.0)
            .bin(0.0)
            .core_distance(10.0, 150.0);
        let expected: Vec<ReconstructedEvent> =
            events.iter().filter(|e| filter.matches(e)).cloned().collect();
        assert_eq!(store.read_events("full", &filter).unwrap(), expected);
    }

    // === PulseStore tests ===

    #[test]
    fn test_pulse_integrals_per_station() {
        let store = test_store();
        store.insert_pulse_integrals(601, &[1200.0, 5000.5, 4800.0]).unwrap();
        store.insert_pulse_integrals(602, &[10.0]).unwrap();
        assert_eq!(store.pulse_integrals(601).unwrap(), vec![1200.0, 5000.5, 4800.0]);
        assert_eq!(store.pulse_integrals(602).unwrap().len(), 1);
        assert!(store.pulse_integrals(603).unwrap().is_empty());
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("master.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            store.create_reconstruction("full", "on disk").unwrap();
            store.append_events("full", &[make_event(2, 0.0, 10.0)]).unwrap();
        }
        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.count_events("full").unwrap(), 1);
        assert_eq!(
            store.get_reconstruction("full").unwrap().unwrap().description,
            "on disk"
        );
    }

    #[test]
    fn test_import_shower_writes_everything() {
        let store = test_store();
        let observables: Vec<Observable> = (0..3).map(|i| make_observable(i, 2)).collect();
        let coincidences: Vec<Coincidence> = (0..3)
            .map(|i| Coincidence { id: i, r: 10.0, phi: 0.1, alpha: 0.2 })
            .collect();
        let id = store
            .import_shower("zenith_0", "shower_0", &observables, &coincidences)
            .unwrap();
        assert_eq!(store.observables(id, None).unwrap(), observables);
        assert_eq!(store.coincidences(id, None).unwrap(), coincidences);
    }

    #[test]
    fn test_failed_import_leaves_no_shower() {
        let store = test_store();
        let observables = vec![make_observable(0, 2)];
        // NaN is written as NULL, which the NOT NULL core distance rejects.
        let bad = vec![Coincidence { id: 0, r: f64::NAN, phi: 0.1, alpha: 0.2 }];
        assert!(matches!(
            store.import_shower("zenith_0", "shower_0", &observables, &bad),
            Err(ShowerError::Database(_))
        ));
        assert!(store.list_showers("zenith_0").unwrap().is_empty());

        // The same shower can be imported again once the data is fixed.
        let good = vec![Coincidence { id: 0, r: 10.0, phi: 0.1, alpha: 0.2 }];
        let id = store
            .import_shower("zenith_0", "shower_0", &observables, &good)
            .unwrap();
        assert_eq!(store.observables(id, None).unwrap().len(), 1);
        assert_eq!(store.list_showers("zenith_0").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_reconstruction() {
        let store = test_store();
        store.create_reconstruction("full", "test").unwrap();
        store
            .append_events("full", &[make_event(2, PI / 8.0, 10.0)])
            .unwrap();

        assert!(store.delete_reconstruction("full").unwrap());
        assert!(!store.has_reconstruction("full").unwrap());
        assert_eq!(store.count_events("full").unwrap(), 0);
        assert!(!store.delete_reconstruction("full").unwrap());
    }
}
