//! Row mapping between entity structs and their tables

use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row};
use std::str::FromStr;

use super::queries;
use crate::error::Result;
use crate::types::*;

/// An entity with a table in the local replica
///
/// Every table shares `id`, `remote_id` and `last_modified`; the remaining
/// columns are listed in `DATA_COLUMNS`, in the order `data_values` yields them.
pub trait StoredEntity: Entity {
    const TABLE: &'static str;
    const DATA_COLUMNS: &'static [&'static str];
    const ORDER_BY: &'static str;
    const ACTIVE_COLUMN: Option<&'static str> = None;
    const FOREIGN_KEY_COLUMN: Option<&'static str> = None;
    const NATURAL_KEY_COLUMN: Option<&'static str> = None;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn data_values(&self) -> Result<Vec<Value>>;

    /// Unbound local records matching a natural key (trimmed, case-insensitive)
    fn natural_key_matches(conn: &Connection, key: &str) -> Result<Vec<Self>> {
        queries::find_unbound_by_natural_key::<Self>(conn, key)
    }
}

fn parse_text<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e: String| {
        let idx = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

fn parse_optional_text<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    let raw: Option<String> = row.get(column)?;
    match raw {
        None => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|e: String| {
            let idx = row.as_ref().column_index(column).unwrap_or(0);
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
        }),
    }
}

fn local_id(row: &Row<'_>) -> rusqlite::Result<LocalId> {
    Ok(LocalId::Assigned(row.get("id")?))
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn flag(b: bool) -> Value {
    Value::Integer(i64::from(b))
}

fn opt_text(s: Option<&str>) -> Value {
    s.map(text).unwrap_or(Value::Null)
}

fn opt_int(i: Option<i64>) -> Value {
    i.map(Value::Integer).unwrap_or(Value::Null)
}

impl StoredEntity for Guest {
    const TABLE: &'static str = "guests";
    const DATA_COLUMNS: &'static [&'static str] = &[
        "name",
        "last_name_abbreviation",
        "invitations",
        "venue_name",
        "notes",
        "is_volunteer_benefit",
        "volunteer_id",
    ];
    const ORDER_BY: &'static str = "name ASC, id ASC";
    const FOREIGN_KEY_COLUMN: Option<&'static str> = Some("volunteer_id");

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Guest {
            id: local_id(row)?,
            remote_id: row.get("remote_id")?,
            name: row.get("name")?,
            last_name_abbreviation: row.get("last_name_abbreviation")?,
            invitations: row.get("invitations")?,
            venue_name: row.get("venue_name")?,
            notes: row.get("notes")?,
            is_volunteer_benefit: row.get("is_volunteer_benefit")?,
            volunteer_id: row.get("volunteer_id")?,
            last_modified: row.get("last_modified")?,
        })
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.name),
            text(&self.last_name_abbreviation),
            Value::Integer(i64::from(self.invitations)),
            text(&self.venue_name),
            text(&self.notes),
            flag(self.is_volunteer_benefit),
            opt_int(self.volunteer_id),
        ])
    }
}

impl StoredEntity for Volunteer {
    const TABLE: &'static str = "volunteers";
    const DATA_COLUMNS: &'static [&'static str] = &[
        "name",
        "last_name_abbreviation",
        "email",
        "phone_number",
        "date_of_birth",
        "gender",
        "current_rank",
        "is_active",
        "last_shift_date",
    ];
    const ORDER_BY: &'static str = "name ASC, id ASC";
    const ACTIVE_COLUMN: Option<&'static str> = Some("is_active");

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Volunteer {
            id: local_id(row)?,
            remote_id: row.get("remote_id")?,
            name: row.get("name")?,
            last_name_abbreviation: row.get("last_name_abbreviation")?,
            email: row.get("email")?,
            phone_number: row.get("phone_number")?,
            date_of_birth: row.get("date_of_birth")?,
            gender: parse_optional_text(row, "gender")?,
            current_rank: parse_optional_text(row, "current_rank")?,
            is_active: row.get("is_active")?,
            last_shift_date: row.get("last_shift_date")?,
            last_modified: row.get("last_modified")?,
        })
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.name),
            text(&self.last_name_abbreviation),
            text(&self.email),
            text(&self.phone_number),
            text(&self.date_of_birth),
            opt_text(self.gender.as_ref().map(Gender::as_str)),
            opt_text(self.current_rank.as_ref().map(VolunteerRank::as_str)),
            flag(self.is_active),
            opt_int(self.last_shift_date),
        ])
    }
}

impl StoredEntity for Job {
    const TABLE: &'static str = "jobs";
    const DATA_COLUMNS: &'static [&'static str] = &[
        "volunteer_id",
        "job_type",
        "job_type_name",
        "venue_name",
        "date",
        "shift_time",
        "notes",
    ];
    const ORDER_BY: &'static str = "date DESC, id DESC";
    const FOREIGN_KEY_COLUMN: Option<&'static str> = Some("volunteer_id");

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Job {
            id: local_id(row)?,
            remote_id: row.get("remote_id")?,
            volunteer_id: row.get("volunteer_id")?,
            job_type: parse_text(row, "job_type")?,
            job_type_name: row.get("job_type_name")?,
            venue_name: row.get("venue_name")?,
            date: row.get("date")?,
            shift_time: parse_text(row, "shift_time")?,
            notes: row.get("notes")?,
            last_modified: row.get("last_modified")?,
        })
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Integer(self.volunteer_id),
            text(self.job_type.as_str()),
            text(&self.job_type_name),
            text(&self.venue_name),
            Value::Integer(self.date),
            text(self.shift_time.as_str()),
            text(&self.notes),
        ])
    }
}

impl StoredEntity for JobTypeConfig {
    const TABLE: &'static str = "job_type_configs";
    const DATA_COLUMNS: &'static [&'static str] = &[
        "name",
        "is_active",
        "is_shift_job",
        "is_orion_job",
        "requires_shift_time",
        "benefit_system_type",
        "manual_rewards",
        "description",
    ];
    const ORDER_BY: &'static str = "name ASC";
    const ACTIVE_COLUMN: Option<&'static str> = Some("is_active");
    const NATURAL_KEY_COLUMN: Option<&'static str> = Some("name");

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let manual_rewards: Option<String> = row.get("manual_rewards")?;
        let manual_rewards = match manual_rewards {
            Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
                let idx = row.as_ref().column_index("manual_rewards").unwrap_or(0);
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })?),
            None => None,
        };

        Ok(JobTypeConfig {
            id: local_id(row)?,
            remote_id: row.get("remote_id")?,
            name: row.get("name")?,
            is_active: row.get("is_active")?,
            is_shift_job: row.get("is_shift_job")?,
            is_orion_job: row.get("is_orion_job")?,
            requires_shift_time: row.get("requires_shift_time")?,
            benefit_system_type: parse_text(row, "benefit_system_type")?,
            manual_rewards,
            description: row.get("description")?,
            last_modified: row.get("last_modified")?,
        })
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        let manual_rewards = match &self.manual_rewards {
            Some(rewards) => Value::Text(serde_json::to_string(rewards)?),
            None => Value::Null,
        };
        Ok(vec![
            text(&self.name),
            flag(self.is_active),
            flag(self.is_shift_job),
            flag(self.is_orion_job),
            flag(self.requires_shift_time),
            text(self.benefit_system_type.as_str()),
            manual_rewards,
            text(&self.description),
        ])
    }
}

impl StoredEntity for Venue {
    const TABLE: &'static str = "venues";
    const DATA_COLUMNS: &'static [&'static str] = &["name", "description", "is_active"];
    const ORDER_BY: &'static str = "name ASC";
    const ACTIVE_COLUMN: Option<&'static str> = Some("is_active");
    const NATURAL_KEY_COLUMN: Option<&'static str> = Some("name");

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Venue {
            id: local_id(row)?,
            remote_id: row.get("remote_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            is_active: row.get("is_active")?,
            last_modified: row.get("last_modified")?,
        })
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.name),
            text(&self.description),
            flag(self.is_active),
        ])
    }
}

impl StoredEntity for Counter {
    const TABLE: &'static str = "people_counter";
    const DATA_COLUMNS: &'static [&'static str] = &["count"];
    const ORDER_BY: &'static str = "id ASC";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Counter {
            id: local_id(row)?,
            remote_id: row.get("remote_id")?,
            count: row.get("count")?,
            last_modified: row.get("last_modified")?,
        })
    }

    fn data_values(&self) -> Result<Vec<Value>> {
        Ok(vec![Value::Integer(self.count)])
    }

    fn natural_key_matches(conn: &Connection, key: &str) -> Result<Vec<Self>> {
        if key != COUNTER_NATURAL_KEY {
            return Ok(vec![]);
        }
        Ok(queries::get_by_id::<Counter>(conn, COUNTER_ID)?
            .filter(|c| c.remote_id.is_none())
            .into_iter()
            .collect())
    }
}
