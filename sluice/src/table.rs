//! In-memory tables and the relational operators the pipelines are built
//! from. A `Table` is a single Arrow `RecordBatch`; every operator returns a
//! new table and leaves its input untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Int64Array, StringArray, UInt32Array};
use arrow::compute::kernels::cmp::eq;
use arrow::compute::{
    CastOptions, SortColumn, cast, cast_with_options, concat_batches, filter_record_batch,
    lexsort_to_indices, take_record_batch,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::row::{RowConverter, SortField};

use crate::context::ExecutionContext;
use crate::error::{EngineError, Result};

// ============================================================================
// Column Expressions
// ============================================================================

/// A projected column: a source column, optionally cast and renamed.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnExpr {
    source: String,
    alias: Option<String>,
    cast: Option<DataType>,
}

/// Reference a column by name.
pub fn col(name: &str) -> ColumnExpr {
    ColumnExpr {
        source: name.to_string(),
        alias: None,
        cast: None,
    }
}

impl ColumnExpr {
    pub fn alias(mut self, name: &str) -> Self {
        self.alias = Some(name.to_string());
        self
    }

    /// Cast to `data_type`. Values that cannot be converted become null.
    pub fn cast(mut self, data_type: DataType) -> Self {
        self.cast = Some(data_type);
        self
    }

    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.source)
    }
}

// ============================================================================
// Table
// ============================================================================

#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(RecordBatch::new_empty(schema))
    }

    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Self> {
        let batch = match batches {
            [] => RecordBatch::new_empty(schema),
            [single] => single.clone(),
            many => concat_batches(&schema, many)?,
        };
        Ok(Self::new(batch))
    }

    /// Build a table from named columns. All columns are nullable.
    pub fn from_columns(columns: Vec<(&str, ArrayRef)>) -> Result<Self> {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect();
        let arrays: Vec<ArrayRef> = columns.into_iter().map(|(_, a)| a).collect();
        let num_rows = arrays.first().map(|a| a.len()).unwrap_or(0);
        build_batch(fields, arrays, num_rows).map(Self::new)
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        self.batch
            .schema()
            .index_of(name)
            .map(|i| self.batch.column(i))
            .map_err(|_| EngineError::ColumnNotFound {
                name: name.to_string(),
                available: self.column_names().join(", "),
            })
    }

    /// Project, rename and cast columns.
    pub fn select(&self, exprs: &[ColumnExpr]) -> Result<Table> {
        let options = CastOptions::default();
        let mut fields = Vec::with_capacity(exprs.len());
        let mut arrays = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let source = self.column(&expr.source)?;
            let array = match &expr.cast {
                Some(dt) if dt != source.data_type() => cast_with_options(source, dt, &options)?,
                _ => Arc::clone(source),
            };
            fields.push(Field::new(
                expr.output_name(),
                array.data_type().clone(),
                true,
            ));
            arrays.push(array);
        }
        build_batch(fields, arrays, self.num_rows()).map(Table::new)
    }

    /// Keep rows where `predicate` is true; null counts as false.
    pub fn filter(&self, predicate: &BooleanArray) -> Result<Table> {
        Ok(Table::new(filter_record_batch(&self.batch, predicate)?))
    }

    /// Keep rows whose `column` equals `value` as text.
    pub fn filter_eq(&self, column: &str, value: &str) -> Result<Table> {
        let values = cast(self.column(column)?, &DataType::Utf8)?;
        let needle = StringArray::new_scalar(value);
        let mask = eq(&values, &needle)?;
        self.filter(&mask)
    }

    /// Add a column, or replace the existing column of the same name in place.
    pub fn with_column(&self, name: &str, array: ArrayRef) -> Result<Table> {
        if array.len() != self.num_rows() {
            return Err(EngineError::LengthMismatch {
                name: name.to_string(),
                expected: self.num_rows(),
                actual: array.len(),
            });
        }
        let schema = self.batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut arrays: Vec<ArrayRef> = self.batch.columns().to_vec();
        let field = Field::new(name, array.data_type().clone(), true);
        match schema.index_of(name) {
            Ok(i) => {
                fields[i] = field;
                arrays[i] = array;
            }
            Err(_) => {
                fields.push(field);
                arrays.push(array);
            }
        }
        build_batch(fields, arrays, self.num_rows()).map(Table::new)
    }

    /// Add an Int64 column of identifiers reserved from the context. Values
    /// increase with row order.
    pub fn with_monotonic_id(&self, ctx: &ExecutionContext, name: &str) -> Result<Table> {
        let ids = Int64Array::from_iter_values(ctx.reserve_ids(self.num_rows()));
        self.with_column(name, Arc::new(ids))
    }

    pub fn take(&self, indices: &UInt32Array) -> Result<Table> {
        Ok(Table::new(take_record_batch(&self.batch, indices)?))
    }

    /// Remove rows equal to an earlier row in every column. Nulls compare
    /// equal to each other. The first occurrence is kept and order preserved.
    pub fn distinct(&self) -> Result<Table> {
        let keys: Vec<ArrayRef> = self.batch.columns().to_vec();
        self.keep_first_by(&keys)
    }

    /// Keep the first row for each distinct combination of `keys`.
    pub fn distinct_on(&self, keys: &[&str]) -> Result<Table> {
        let keys = keys
            .iter()
            .map(|k| self.column(k).cloned())
            .collect::<Result<Vec<_>>>()?;
        self.keep_first_by(&keys)
    }

    fn keep_first_by(&self, keys: &[ArrayRef]) -> Result<Table> {
        if self.num_rows() == 0 || keys.is_empty() {
            return Ok(self.clone());
        }
        let converter = RowConverter::new(sort_fields(keys))?;
        let rows = converter.convert_columns(keys)?;
        let mut seen = HashSet::with_capacity(rows.num_rows());
        let keep: Vec<u32> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| seen.insert(*row))
            .map(|(i, _)| i as u32)
            .collect();
        if keep.len() == self.num_rows() {
            return Ok(self.clone());
        }
        self.take(&UInt32Array::from(keep))
    }

    /// Stable ascending sort, nulls first.
    pub fn sort_by(&self, keys: &[&str]) -> Result<Table> {
        if self.num_rows() == 0 {
            return Ok(self.clone());
        }
        let columns = keys
            .iter()
            .map(|k| {
                Ok(SortColumn {
                    values: Arc::clone(self.column(k)?),
                    options: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let indices = lexsort_to_indices(&columns, None)?;
        self.take(&indices)
    }

    /// Inner equi-join. `on` pairs a left column with a right column; right
    /// keys are cast to the left key types. Rows with a null key never match.
    /// Output has every left column followed by every right column, in left
    /// row order, and each left row repeats once per matching right row.
    pub fn inner_join(&self, right: &Table, on: &[(&str, &str)]) -> Result<Table> {
        let left_keys = on
            .iter()
            .map(|(l, _)| self.column(l).cloned())
            .collect::<Result<Vec<_>>>()?;
        let right_keys = on
            .iter()
            .zip(&left_keys)
            .map(|((_, r), lk)| Ok(cast(right.column(r)?, lk.data_type())?))
            .collect::<Result<Vec<_>>>()?;

        let (left_idx, right_idx) = if on.is_empty() || self.num_rows() == 0 {
            (Vec::new(), Vec::new())
        } else {
            let converter = RowConverter::new(sort_fields(&left_keys))?;
            let left_rows = converter.convert_columns(&left_keys)?;
            let right_rows = converter.convert_columns(&right_keys)?;

            let mut build: HashMap<_, Vec<u32>> = HashMap::with_capacity(right_rows.num_rows());
            for (i, row) in right_rows.iter().enumerate() {
                if !any_null(&right_keys, i) {
                    build.entry(row).or_default().push(i as u32);
                }
            }

            let mut left_idx = Vec::new();
            let mut right_idx = Vec::new();
            for (i, row) in left_rows.iter().enumerate() {
                if any_null(&left_keys, i) {
                    continue;
                }
                if let Some(matches) = build.get(&row) {
                    for &r in matches {
                        left_idx.push(i as u32);
                        right_idx.push(r);
                    }
                }
            }
            (left_idx, right_idx)
        };

        let num_rows = left_idx.len();
        let left = self.take(&UInt32Array::from(left_idx))?;
        let right = right.take(&UInt32Array::from(right_idx))?;

        let mut fields: Vec<Field> = Vec::new();
        let mut arrays: Vec<ArrayRef> = Vec::new();
        for side in [&left, &right] {
            let schema = side.schema();
            for (field, array) in schema.fields().iter().zip(side.batch.columns()) {
                fields.push(field.as_ref().clone());
                arrays.push(Arc::clone(array));
            }
        }
        build_batch(fields, arrays, num_rows).map(Table::new)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn sort_fields(columns: &[ArrayRef]) -> Vec<SortField> {
    columns
        .iter()
        .map(|c| SortField::new(c.data_type().clone()))
        .collect()
}

fn any_null(columns: &[ArrayRef], row: usize) -> bool {
    columns.iter().any(|c| c.is_null(row))
}

fn build_batch(fields: Vec<Field>, arrays: Vec<ArrayRef>, num_rows: usize) -> Result<RecordBatch> {
    let mut names = HashSet::with_capacity(fields.len());
    for field in &fields {
        if !names.insert(field.name().clone()) {
            return Err(EngineError::DuplicateColumn(field.name().clone()));
        }
    }
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}

// ============================================================================
// Tests
// ============================================================================
