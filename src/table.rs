use std::collections::HashMap;

use polars::prelude::*;

use crate::error::{DatasetError, Result};

/// The table without columns or rows.
pub fn empty() -> DataFrame {
    DataFrame::default()
}

/// Type both columns can be cast to without losing values: numbers widen to
/// `Int64` or `Float64`, anything else falls back to strings.
fn supertype(left: &DataType, right: &DataType) -> DataType {
    if left == right {
        return left.clone();
    }
    match (left, right) {
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (l, r) if l.is_numeric() && r.is_numeric() => {
            if l.is_float() || r.is_float() {
                DataType::Float64
            } else {
                DataType::Int64
            }
        },
        _ => DataType::Utf8,
    }
}

/// Target type per column name. Columns holding only nulls carry no type
/// information and only decide when no frame has a value for the column.
fn target_dtypes(frames: &[DataFrame]) -> HashMap<String, DataType> {
    let mut typed: HashMap<String, DataType> = HashMap::new();
    let mut untyped: HashMap<String, DataType> = HashMap::new();
    for df in frames {
        for s in df.get_columns() {
            let target = if s.null_count() == s.len() { &mut untyped } else { &mut typed };
            let dtype = match target.get(s.name()) {
                Some(dtype) => supertype(dtype, s.dtype()),
                None => s.dtype().clone(),
            };
            target.insert(s.name().to_string(), dtype);
        }
    }
    for (name, dtype) in untyped {
        typed.entry(name).or_insert(dtype);
    }
    typed
}

fn cast_to(mut df: DataFrame, dtypes: &HashMap<String, DataType>) -> PolarsResult<DataFrame> {
    let names = df.get_column_names().into_iter().map(|c| c.to_string()).collect::<Vec<String>>();
    for name in names {
        let Some(dtype) = dtypes.get(&name) else { continue };
        if df.column(&name)?.dtype() != dtype {
            let s = df.column(&name)?.cast(dtype)?;
            df.with_column(s)?;
        }
    }
    Ok(df)
}

/// Stacks `frames` in order on the union of their columns.
///
/// Columns a frame lacks are null for that frame's rows, and a column whose
/// type differs between frames is cast to a common type first. Frames without
/// columns are skipped, and the columns of the result are sorted by name.
pub fn concat_tables(frames: impl IntoIterator<Item = DataFrame>) -> Result<DataFrame> {
    let frames = frames.into_iter().filter(|df| df.width() > 0).collect::<Vec<DataFrame>>();
    if frames.is_empty() {
        return Ok(empty());
    }

    let dtypes = target_dtypes(&frames);
    let frames = frames
        .into_iter()
        .map(|df| cast_to(df, &dtypes).map(|df| df.lazy()))
        .collect::<PolarsResult<Vec<LazyFrame>>>()
        .map_err(DatasetError::Concat)?;

    let df = concat_lf_diagonal(frames, UnionArgs::default())
        .and_then(|lf| lf.collect())
        .map_err(DatasetError::Concat)?;

    let mut columns = df
        .get_column_names()
        .into_iter()
        .map(|c| c.to_string())
        .collect::<Vec<String>>();
    columns.sort();
    df.select(columns).map_err(DatasetError::Concat)
}

pub fn append(base: &DataFrame, other: &DataFrame) -> Result<DataFrame> {
    concat_tables([base.clone(), other.clone()])
}
