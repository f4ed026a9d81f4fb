//! Cached company directory
//!
//! Read-only from the app's perspective: the cache is replaced wholesale on
//! each successful refresh from the repository, never edited in place.

use fieldnote_common::api::types::{Company, Contact};
use fieldnote_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Replace the entire cached directory in a single transaction
pub async fn replace_all(pool: &SqlitePool, companies: &[Company]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM companies").execute(&mut *tx).await?;

    for company in companies {
        let aliases = serde_json::to_string(&company.aliases)
            .map_err(|e| Error::Internal(format!("Failed to serialize aliases: {e}")))?;
        let study_programs = serde_json::to_string(&company.study_programs)
            .map_err(|e| Error::Internal(format!("Failed to serialize study programs: {e}")))?;
        let contacts = serde_json::to_string(&company.contacts)
            .map_err(|e| Error::Internal(format!("Failed to serialize contacts: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO companies (
                id, name, short_name, aliases, location, partnership_type,
                study_programs, contacts, notes, last_contact_date
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&company.id)
        .bind(&company.name)
        .bind(&company.short_name)
        .bind(&aliases)
        .bind(&company.location)
        .bind(&company.partnership_type)
        .bind(&study_programs)
        .bind(&contacts)
        .bind(&company.notes)
        .bind(&company.last_contact_date)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// All cached companies, name order
pub async fn all(pool: &SqlitePool) -> Result<Vec<Company>> {
    let rows = sqlx::query("SELECT * FROM companies ORDER BY name ASC")
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(company_from_row).collect()
}

/// Load one company by id
pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<Company>> {
    let row = sqlx::query("SELECT * FROM companies WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(company_from_row).transpose()
}

/// Number of cached companies
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM companies")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Case-insensitive search over name, short name, aliases, and location
///
/// An empty query returns the full directory. The alias/location match runs
/// in Rust because aliases live in a JSON column.
pub async fn search(pool: &SqlitePool, query: &str) -> Result<Vec<Company>> {
    let companies = all(pool).await?;
    if query.trim().is_empty() {
        return Ok(companies);
    }
    Ok(companies
        .into_iter()
        .filter(|c| c.matches_query(query))
        .collect())
}

/// Primary contact of a company: first flagged primary, else first in list
pub async fn primary_contact(pool: &SqlitePool, company_id: &str) -> Result<Option<Contact>> {
    Ok(get(pool, company_id)
        .await?
        .and_then(|c| c.primary_contact().cloned()))
}

fn company_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Company> {
    let aliases: String = row.get("aliases");
    let aliases = serde_json::from_str(&aliases)
        .map_err(|e| Error::Internal(format!("Failed to deserialize aliases: {e}")))?;

    let study_programs: String = row.get("study_programs");
    let study_programs = serde_json::from_str(&study_programs)
        .map_err(|e| Error::Internal(format!("Failed to deserialize study programs: {e}")))?;

    let contacts: String = row.get("contacts");
    let contacts = serde_json::from_str(&contacts)
        .map_err(|e| Error::Internal(format!("Failed to deserialize contacts: {e}")))?;

    Ok(Company {
        id: row.get("id"),
        name: row.get("name"),
        short_name: row.get("short_name"),
        aliases,
        location: row.get("location"),
        partnership_type: row.get("partnership_type"),
        study_programs,
        contacts,
        notes: row.get("notes"),
        last_contact_date: row.get("last_contact_date"),
    })
}
