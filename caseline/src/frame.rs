//! Small helpers over polars frames shared by the pipeline stages.

use itertools::Itertools;
use polars::prelude::*;

/// Names of all columns of `df`, in order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .map(|s| s.name().to_string())
        .collect()
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

/// Rewrite a column value by value. The column is read as strings; `f` sees `None` for nulls and
/// its `None` results become nulls.
pub fn map_str_column<F>(df: &DataFrame, column: &str, f: F) -> PolarsResult<DataFrame>
where
    F: Fn(Option<&str>) -> Option<String>,
{
    let values = df.column(column)?.cast(&DataType::String)?;
    let mapped: StringChunked = values.str()?.into_iter().map(&f).collect();
    let mut out = df.clone();
    out.with_column(mapped.with_name(column).into_series())?;
    Ok(out)
}

/// True where `column` holds a non-blank string that is not one of `sentinels`.
pub fn usable_identifier(column: &str, sentinels: &[String]) -> Expr {
    let value = col(column).cast(DataType::String);
    let present = value
        .clone()
        .is_not_null()
        .and(value.clone().str().strip_chars(lit(NULL)).neq(lit("")));
    if sentinels.is_empty() {
        present
    } else {
        let sentinels = Series::new("sentinels", sentinels.to_vec());
        present.and(value.is_in(lit(sentinels)).not())
    }
}

/// Stack frames whose columns may differ. The output has the union of all columns, `leading`
/// ones first; columns missing from a frame are filled with nulls of the type they have
/// elsewhere.
pub fn concat_aligned(frames: Vec<DataFrame>, leading: &[&str]) -> PolarsResult<DataFrame> {
    if frames.is_empty() {
        return Ok(DataFrame::empty());
    }
    let mut columns: Vec<(String, DataType)> = vec![];
    for df in &frames {
        for s in df.get_columns() {
            let name = s.name().to_string();
            if !columns.iter().any(|(c, _)| *c == name) {
                columns.push((name, s.dtype().clone()));
            }
        }
    }
    // Null-typed columns (e.g. an all-null literal) cannot be unioned with typed ones
    for (name, dtype) in columns.iter_mut() {
        if *dtype == DataType::Null {
            let name = name.as_str();
            *dtype = frames
                .iter()
                .filter_map(|df| df.column(name).ok())
                .map(|s| s.dtype().clone())
                .find(|dt| *dt != DataType::Null)
                .unwrap_or(DataType::String);
        }
    }
    columns.sort_by_key(|(name, _)| {
        leading
            .iter()
            .position(|l| *l == name.as_str())
            .unwrap_or(leading.len())
    });

    let lazy_frames = frames
        .into_iter()
        .map(|df| {
            let exprs = columns
                .iter()
                .map(|(name, dtype)| {
                    if has_column(&df, name) {
                        col(name.as_str()).cast(dtype.clone())
                    } else {
                        lit(NULL).cast(dtype.clone()).alias(name.as_str())
                    }
                })
                .collect_vec();
            df.lazy().select(exprs)
        })
        .collect_vec();
    concat(lazy_frames, UnionArgs::default())?.collect()
}
