//! Arrow layout of the chunk table and conversions to and from [`Chunk`].
use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Int32Type};
use arrow_array::{Array, FixedSizeListArray, Int32Array, ListArray, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

use evidence_core::types::Chunk;

pub const VECTOR_COLUMN: &str = "vector";

pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("document_id", DataType::Utf8, false),
		Field::new("pages", DataType::List(Arc::new(Field::new("item", DataType::Int32, true))), true),
		Field::new("paragraph_index", DataType::Int32, false),
		Field::new("table_ref", DataType::Utf8, true),
		Field::new("figure_ref", DataType::Utf8, true),
		Field::new("section", DataType::Utf8, true),
		Field::new("text", DataType::Utf8, false),
		Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Every chunk's embedding must have exactly `dim` values.
pub fn chunks_to_record_batch(chunks: &[Chunk], dim: i32) -> Result<RecordBatch> {
	let expected = usize::try_from(dim)?;
	if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != expected) {
		return Err(anyhow!("chunk {} has {} dims, table expects {}", bad.id, bad.embedding.len(), expected));
	}
	let mut paragraph_indices = Vec::with_capacity(chunks.len());
	let mut pages: Vec<Option<Vec<Option<i32>>>> = Vec::with_capacity(chunks.len());
	for c in chunks {
		paragraph_indices.push(i32::try_from(c.paragraph_index)?);
		let p = c.pages.iter().map(|&p| i32::try_from(p).map(Some)).collect::<Result<Vec<_>, _>>()?;
		pages.push(Some(p));
	}
	let vectors = chunks.iter().map(|c| Some(c.embedding.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
	let batch = RecordBatch::try_new(build_chunk_schema(dim), vec![
		Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.id.as_str()))),
		Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.document_id.as_str()))),
		Arc::new(ListArray::from_iter_primitive::<Int32Type, _, _>(pages)),
		Arc::new(Int32Array::from(paragraph_indices)),
		Arc::new(chunks.iter().map(|c| c.table_ref.as_deref()).collect::<StringArray>()),
		Arc::new(chunks.iter().map(|c| c.figure_ref.as_deref()).collect::<StringArray>()),
		Arc::new(chunks.iter().map(|c| c.section.as_deref()).collect::<StringArray>()),
		Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.text.as_str()))),
		Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
	])?;
	Ok(batch)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_string_opt::<i32>())
		.ok_or_else(|| anyhow!("column '{}' missing or not utf8", name))
}

fn opt_string(col: &StringArray, i: usize) -> Option<String> {
	if col.is_null(i) { None } else { Some(col.value(i).to_string()) }
}

pub fn batch_to_chunks(batch: &RecordBatch) -> Result<Vec<Chunk>> {
	let ids = string_column(batch, "id")?;
	let document_ids = string_column(batch, "document_id")?;
	let table_refs = string_column(batch, "table_ref")?;
	let figure_refs = string_column(batch, "figure_ref")?;
	let sections = string_column(batch, "section")?;
	let texts = string_column(batch, "text")?;
	let pages = batch
		.column_by_name("pages")
		.and_then(|c| c.as_list_opt::<i32>())
		.ok_or_else(|| anyhow!("column 'pages' missing or not a list"))?;
	let paragraphs = batch
		.column_by_name("paragraph_index")
		.and_then(|c| c.as_primitive_opt::<Int32Type>())
		.ok_or_else(|| anyhow!("column 'paragraph_index' missing or not int32"))?;
	let vectors = batch.column_by_name(VECTOR_COLUMN).and_then(|c| c.as_fixed_size_list_opt());

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let page_list = if pages.is_null(i) {
			Vec::new()
		} else {
			pages
				.value(i)
				.as_primitive_opt::<Int32Type>()
				.map(|a| a.iter().flatten().filter_map(|p| u32::try_from(p).ok()).collect())
				.unwrap_or_default()
		};
		let embedding = match vectors {
			Some(v) if !v.is_null(i) => v
				.value(i)
				.as_primitive_opt::<Float32Type>()
				.map(|a| a.values().to_vec())
				.unwrap_or_default(),
			_ => Vec::new(),
		};
		out.push(Chunk {
			id: ids.value(i).to_string(),
			document_id: document_ids.value(i).to_string(),
			pages: page_list,
			paragraph_index: u32::try_from(paragraphs.value(i)).unwrap_or(0),
			table_ref: opt_string(table_refs, i),
			figure_ref: opt_string(figure_refs, i),
			section: opt_string(sections, i),
			text: texts.value(i).to_string(),
			embedding,
		});
	}
	Ok(out)
}
