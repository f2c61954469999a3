use std::path::Path;

use anyhow::{Context, anyhow};
use duckdb::{Connection, params};
use serde::Serialize;

use crate::cli::SeedArgs;
use crate::storage::{StoragePaths, file_present_nonempty};

#[derive(Debug, Serialize)]
struct SeedMeta {
    seeded_at_utc: String,
    providers_csv: String,
    duckdb_path: String,
    provider_count: u64,
}

pub fn run(opts: SeedArgs) -> anyhow::Result<()> {
    tracing::info!("pcp-backend seed");
    tracing::info!("data_dir={}", opts.data_dir);
    tracing::info!("providers_csv={}", opts.providers_csv);
    if opts.rebuild {
        tracing::info!("rebuild=true (will recreate tables)");
    }

    let paths = StoragePaths::new(&opts.data_dir);
    paths.ensure_dirs().context("create backend data directory")?;

    let csv = Path::new(&opts.providers_csv);
    if !file_present_nonempty(csv) {
        return Err(anyhow!(
            "Provider roster CSV not found at {}",
            csv.display()
        ));
    }

    let mut conn = Connection::open(&paths.duckdb_path)
        .with_context(|| format!("open duckdb at {}", paths.duckdb_path.display()))?;

    if opts.rebuild || !table_exists(&mut conn, "providers")? {
        load_providers(&mut conn, csv).context("load providers table")?;
    } else {
        tracing::info!("DuckDB table providers already exists; skipping");
    }

    if opts.rebuild || !table_exists(&mut conn, "pcp_submissions")? {
        create_submissions_table(&mut conn).context("create pcp_submissions table")?;
    } else {
        tracing::info!("DuckDB table pcp_submissions already exists; skipping");
    }

    let provider_count = one_u64(&mut conn, "SELECT COUNT(*) FROM providers")?;

    let meta = SeedMeta {
        seeded_at_utc: chrono::Utc::now().to_rfc3339(),
        providers_csv: csv.display().to_string(),
        duckdb_path: paths.duckdb_path.display().to_string(),
        provider_count,
    };
    write_json(&paths.meta_path, &meta).context("write meta.json")?;

    tracing::info!("Seed complete: {} provider rows.", provider_count);
    tracing::info!("DuckDB: {}", paths.duckdb_path.display());

    Ok(())
}

fn load_providers(conn: &mut Connection, csv: &Path) -> anyhow::Result<()> {
    tracing::info!("Loading providers from {}...", csv.display());
    conn.execute("DROP TABLE IF EXISTS providers", [])?;

    let csv = sql_quote_path(csv);
    let sql = format!(
        r#"
        CREATE TABLE providers AS
        SELECT
          TRIM(provider_name) AS provider_name,
          TRIM(CAST(npi AS VARCHAR)) AS npi,
          TRIM(insurance) AS insurance,
          TRIM(location) AS location,
          CAST(priority AS INTEGER) AS priority
        FROM read_csv('{csv}', header = true)
        WHERE provider_name IS NOT NULL AND TRIM(provider_name) <> ''
    "#
    );
    conn.execute(&sql, [])?;
    Ok(())
}

pub fn create_submissions_table(conn: &mut Connection) -> anyhow::Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS pcp_submissions (
          insurance TEXT,
          location TEXT,
          pdf_url TEXT,
          submitted_at TEXT
        )
    "#,
        [],
    )?;
    Ok(())
}

pub fn table_exists(conn: &mut Connection, name: &str) -> anyhow::Result<bool> {
    let mut stmt = conn.prepare(
        r#"
        SELECT COUNT(*)::BIGINT
        FROM information_schema.tables
        WHERE table_schema = 'main' AND table_name = ?
    "#,
    )?;
    let count: i64 = stmt.query_row(params![name], |row| row.get(0))?;
    Ok(count > 0)
}

fn one_u64(conn: &mut Connection, sql: &str) -> anyhow::Result<u64> {
    let mut stmt = conn.prepare(sql)?;
    let v: i64 = stmt.query_row([], |row| row.get(0))?;
    Ok(v.max(0) as u64)
}

fn write_json(path: &Path, v: &impl Serialize) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let s = serde_json::to_string_pretty(v)?;
    std::fs::write(path, s)?;
    Ok(())
}

fn sql_quote_path(path: &Path) -> String {
    // DuckDB expects single-quoted string literals; escape embedded single quotes.
    path.display().to_string().replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn seeding_from_csv_produces_a_queryable_roster() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("providers.csv");
        let mut f = std::fs::File::create(&csv_path).expect("create csv");
        writeln!(f, "provider_name,npi,insurance,location,priority").unwrap();
        writeln!(f, "Dr. Astoria,1000000001,Aetna,Astoria,1").unwrap();
        writeln!(f, "Dr. Fallback,1000000002,Aetna,ALL,2").unwrap();
        f.flush().unwrap();

        let mut conn = Connection::open_in_memory().expect("open in-memory duckdb");
        load_providers(&mut conn, &csv_path).expect("load csv");
        create_submissions_table(&mut conn).expect("create submissions");

        assert!(table_exists(&mut conn, "providers").unwrap());
        assert!(table_exists(&mut conn, "pcp_submissions").unwrap());
        assert_eq!(one_u64(&mut conn, "SELECT COUNT(*) FROM providers").unwrap(), 2);

        let hit = crate::lookup::find_provider(&conn, "Aetna", "Astoria")
            .unwrap()
            .unwrap();
        assert_eq!(hit.npi, "1000000001");
    }
}
