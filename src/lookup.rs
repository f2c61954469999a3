use anyhow::Context;
use duckdb::{Connection, OptionalExt};
use serde::Serialize;

use crate::mapping;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderMatch {
    pub provider_name: String,
    pub npi: String,
}

/// Picks the single best provider row for an (insurance, location) pair.
///
/// The plan label is expanded through the insurance synonym table and the
/// location label is normalized before matching. Rows at the requested
/// location win over rows covering ALL locations; within a tier the lowest
/// `priority` wins.
pub fn find_provider(
    conn: &Connection,
    insurance: &str,
    location: &str,
) -> anyhow::Result<Option<ProviderMatch>> {
    let insurances = mapping::expand_insurance(insurance);
    let db_location = mapping::normalize_location(location);

    let placeholders = vec!["?"; insurances.len()].join(",");
    let sql = format!(
        r#"
        SELECT provider_name, npi
        FROM (
          SELECT provider_name, npi, priority, 1 AS match_tier
          FROM providers
          WHERE insurance IN ({placeholders})
            AND LOWER(location) = LOWER(?)

          UNION ALL

          SELECT provider_name, npi, priority, 2 AS match_tier
          FROM providers
          WHERE insurance IN ({placeholders})
            AND LOWER(location) = 'all'
        )
        ORDER BY match_tier ASC, priority ASC
        LIMIT 1
    "#
    );

    let mut params: Vec<&str> = Vec::with_capacity(insurances.len() * 2 + 1);
    params.extend(insurances.iter().copied());
    params.push(db_location);
    params.extend(insurances.iter().copied());

    let mut stmt = conn.prepare(&sql).context("prepare provider lookup")?;
    let hit = stmt
        .query_row(duckdb::params_from_iter(params), |row| {
            Ok(ProviderMatch {
                provider_name: row.get(0)?,
                npi: row.get(1)?,
            })
        })
        .optional()
        .context("query provider lookup")?;

    Ok(hit)
}
