use rusqlite::Connection;

use hisparc_core::ShowerError;

pub fn init_db(conn: &Connection) -> Result<(), ShowerError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS showers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            simulation TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(simulation, name)
        );

        CREATE INDEX IF NOT EXISTS idx_showers_simulation ON showers(simulation);

        -- One row per shower placement, in simulation order
        CREATE TABLE IF NOT EXISTS observables (
            shower_id INTEGER NOT NULL REFERENCES showers(id) ON DELETE CASCADE,
            id INTEGER NOT NULL,
            t1 REAL, t2 REAL, t3 REAL, t4 REAL,
            n1 INTEGER NOT NULL, n2 INTEGER NOT NULL,
            n3 INTEGER NOT NULL, n4 INTEGER NOT NULL,
            r REAL NOT NULL,
            phi REAL NOT NULL,
            alpha REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_observables_shower ON observables(shower_id);

        CREATE TABLE IF NOT EXISTS coincidences (
            shower_id INTEGER NOT NULL REFERENCES showers(id) ON DELETE CASCADE,
            id INTEGER NOT NULL,
            r REAL NOT NULL,
            phi REAL NOT NULL,
            alpha REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_coincidences_shower ON coincidences(shower_id);

        CREATE TABLE IF NOT EXISTS pulse_integrals (
            station INTEGER NOT NULL,
            integral REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_pulse_integrals_station ON pulse_integrals(station);

        -- Reconstruction tables
        CREATE TABLE IF NOT EXISTS reconstructions (
            name TEXT PRIMARY KEY,
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reconstructed_events (
            reconstruction TEXT NOT NULL REFERENCES reconstructions(name) ON DELETE CASCADE,
            r REAL, phi REAL, alpha REAL,
            t1 REAL, t2 REAL, t3 REAL, t4 REAL,
            n1 INTEGER NOT NULL, n2 INTEGER NOT NULL,
            n3 INTEGER NOT NULL, n4 INTEGER NOT NULL,
            sim_theta REAL NOT NULL,
            sim_phi REAL,
            r_theta REAL NOT NULL,
            r_phi REAL NOT NULL,
            D INTEGER NOT NULL,
            size INTEGER NOT NULL,
            bin REAL NOT NULL DEFAULT 0,
            bin_r INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_events_reconstruction ON reconstructed_events(reconstruction);
        CREATE INDEX IF NOT EXISTS idx_events_variant
            ON reconstructed_events(reconstruction, sim_theta, size, bin);
        ",
    )
    .map_err(|e| ShowerError::Database(e.to_string()))?;

    Ok(())
}
