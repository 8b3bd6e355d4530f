//! LanceDB connection helpers and the on-disk layout of an index directory.

use anyhow::{Context, Result};
use lancedb::{connect, Connection, Table};
use std::path::{Path, PathBuf};

/// LanceDB lives in this subdirectory; manifest and corpus sit next to it.
pub const LANCE_SUBDIR: &str = "lance";

pub fn lance_dir(index_dir: &Path) -> PathBuf {
	index_dir.join(LANCE_SUBDIR)
}

pub async fn open_db(index_dir: &Path) -> Result<Connection> {
	let uri = lance_dir(index_dir);
	connect(uri.to_string_lossy().as_ref())
		.execute()
		.await
		.with_context(|| format!("Failed to open LanceDB at {}", uri.display()))
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
	Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

pub async fn open_table(index_dir: &Path, name: &str) -> Result<Table> {
	let conn = open_db(index_dir).await?;
	if !table_exists(&conn, name).await? {
		anyhow::bail!("table '{}' not found in {}", name, lance_dir(index_dir).display());
	}
	Ok(conn.open_table(name).execute().await?)
}
