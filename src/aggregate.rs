use crate::{
    error::{Error, Result},
    table::Dataset,
};
use arrow::array::{Array, Float64Array, StringArray};
use serde::Serialize;
use std::{collections::HashMap, fmt};

/// One group's summed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrantTotal {
    pub grantee: String,
    pub amount: f64,
}

/// Sum `value` per distinct `key` and keep the `n` largest sums.
///
/// Both columns must already be non-null (Utf8 key, Float64 value). Groups
/// with equal sums are ordered by key ascending, so the output depends only
/// on the input rows. Groups whose sum is NaN are left out.
pub fn top_n_by_sum(dataset: &Dataset, key: &str, value: &str, n: usize) -> Result<Vec<GrantTotal>> {
    let batch = dataset.batch();
    let keys = batch
        .column(dataset.column_index(key)?)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::Internal(format!("group column `{}` is not Utf8", key)))?;
    let values = batch
        .column(dataset.column_index(value)?)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| Error::Internal(format!("value column `{}` is not Float64", value)))?;
    if keys.null_count() > 0 || values.null_count() > 0 {
        return Err(Error::Internal(format!(
            "`{}` and `{}` must be filled before aggregating",
            key, value
        )));
    }

    let mut sums: HashMap<&str, f64> = HashMap::new();
    for (k, v) in keys.iter().zip(values.iter()) {
        if let (Some(k), Some(v)) = (k, v) {
            *sums.entry(k).or_insert(0.0) += v;
        }
    }

    // A group mixing +inf and -inf sums to NaN and has no rank.
    let mut ranked: Vec<(&str, f64)> = sums.into_iter().filter(|(_, s)| !s.is_nan()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(n);

    Ok(ranked
        .into_iter()
        .map(|(grantee, amount)| GrantTotal {
            grantee: grantee.to_string(),
            amount,
        })
        .collect())
}

/// Outcome of one successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub top_n: usize,
    pub top: Vec<GrantTotal>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Processed {} rows. Top {}: {{", self.rows, self.top_n)?;
        for (i, t) in self.top.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", quote(&t.grantee), render_float(t.amount))?;
        }
        f.write_str("}")
    }
}

/// Single quotes unless the text holds a `'` and no `"`.
fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

/// Shortest round-trip digits, always with a decimal point or exponent.
/// Exponent form below 1e-4 and from 1e16 up, e.g. `1e+16`, `2.5e-05`.
fn render_float(v: f64) -> String {
    if v.is_infinite() {
        return if v > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if v.is_nan() {
        return "nan".into();
    }
    let abs = v.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let sci = format!("{:e}", v);
        return match sci.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => sci,
        };
    }
    let plain = v.to_string();
    if plain.contains('.') {
        plain
    } else {
        format!("{}.0", plain)
    }
}
