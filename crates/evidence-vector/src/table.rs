//! LanceDB connection helpers.
use anyhow::{anyhow, Result};
use arrow_schema::DataType;
use lancedb::{connect, Connection, Table};

use crate::schema::VECTOR_COLUMN;

pub async fn open_db(uri: &str) -> Result<Connection> {
	Ok(connect(uri).execute().await?)
}

pub async fn open_table(uri: &str, name: &str) -> Result<Table> {
	let conn = open_db(uri).await?;
	Ok(conn.open_table(name).execute().await?)
}

/// Embedding dimension recorded in the table schema at build time.
pub async fn vector_dim(table: &Table) -> Result<usize> {
	let schema = table.schema().await?;
	let field = schema.field_with_name(VECTOR_COLUMN)?;
	match field.data_type() {
		DataType::FixedSizeList(_, n) => Ok(usize::try_from(*n)?),
		other => Err(anyhow!("column '{}' has type {:?}, expected a fixed-size list", VECTOR_COLUMN, other)),
	}
}
