// src/table.rs
use crate::error::{Error, Result, SchemaError};
use arrow::{
    array::{Array, ArrayRef, Float64Array, Float64Builder, StringArray},
    compute::{cast, concat_batches},
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{collections::HashMap, io::Cursor, sync::Arc};
use tracing::{debug, trace};

/// Cell tokens read as absent when no override is configured.
pub const DEFAULT_NULL_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

static DEFAULT_NULL_REGEX: Lazy<Regex> = Lazy::new(|| {
    null_regex(DEFAULT_NULL_VALUES.iter().copied()).expect("default null tokens form a valid regex")
});

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Matches a cell exactly equal to one of `tokens`.
pub fn null_regex<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<Regex> {
    let alternatives: Vec<String> = tokens.into_iter().map(regex::escape).collect();
    Regex::new(&format!("^(?:{})$", alternatives.join("|")))
        .map_err(|e| Error::Internal(format!("building null-value pattern: {}", e)))
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub null_values: Regex,
    pub batch_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            null_values: DEFAULT_NULL_REGEX.clone(),
            batch_size: 8192,
        }
    }
}

/// Trim, lowercase, spaces to underscores.
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// A rectangular table held as one arrow batch. Every column starts out as
/// nullable Utf8; the transform methods below retype columns in place.
#[derive(Debug, Clone)]
pub struct Dataset {
    batch: RecordBatch,
}

impl Dataset {
    /// Parse delimited text with a mandatory header row.
    ///
    /// Rows shorter than the header are padded with nulls, longer rows are
    /// rejected. A blank header cell at position `i` is named `Unnamed: i`.
    #[tracing::instrument(level = "debug", skip(data, options), fields(bytes = data.len()))]
    pub fn load(data: &[u8], options: &LoadOptions) -> Result<Self> {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

        let (inferred, _) = Format::default()
            .with_header(true)
            .infer_schema(Cursor::new(data), Some(0))
            .map_err(|e| Error::Parse(format!("reading header row: {}", e)))?;
        if inferred.fields().is_empty() {
            return Err(Error::Parse("input has no header row".into()));
        }

        let fields: Vec<Field> = inferred
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let name = if f.name().trim().is_empty() {
                    format!("Unnamed: {}", i)
                } else {
                    f.name().clone()
                };
                Field::new(name, DataType::Utf8, true)
            })
            .collect();
        let schema = Arc::new(Schema::new(fields));
        trace!(columns = schema.fields().len(), "header parsed");

        let reader = ReaderBuilder::new(schema.clone())
            .with_header(true)
            .with_null_regex(options.null_values.clone())
            .with_truncated_rows(true)
            .with_batch_size(options.batch_size.max(1))
            .build(Cursor::new(data))
            .map_err(|e| Error::Parse(format!("creating CSV reader: {}", e)))?;

        let mut batches = Vec::new();
        for batch in reader {
            batches.push(batch.map_err(|e| Error::Parse(e.to_string()))?);
        }
        let batch = concat_batches(&schema, &batches)
            .map_err(|e| Error::Internal(format!("concatenating batches: {}", e)))?;

        debug!(rows = batch.num_rows(), columns = batch.num_columns(), "loaded dataset");
        Ok(Self { batch })
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

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Rename every column through [`normalize_column_name`]. Two columns
    /// landing on the same name is a schema error and leaves the dataset
    /// untouched.
    pub fn normalize_column_names(&mut self) -> Result<()> {
        let schema = self.batch.schema();
        let mut seen: HashMap<String, &str> = HashMap::with_capacity(schema.fields().len());
        let mut fields = Vec::with_capacity(schema.fields().len());

        for field in schema.fields() {
            let normalized = normalize_column_name(field.name());
            if let Some(first) = seen.get(&normalized) {
                return Err(SchemaError::DuplicateColumn {
                    normalized,
                    first: first.to_string(),
                    second: field.name().clone(),
                }
                .into());
            }
            seen.insert(normalized.clone(), field.name());
            fields.push(field.as_ref().clone().with_name(normalized));
        }

        debug!(columns = ?fields.iter().map(|f| f.name()).collect::<Vec<_>>(), "normalized header");
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), self.batch.columns().to_vec())
            .map_err(|e| Error::Internal(format!("renaming columns: {}", e)))?;
        self.batch = batch;
        Ok(())
    }

    /// Fails on the first name in `names` that is not a column.
    pub fn require_columns(&self, names: &[&str]) -> Result<()> {
        for name in names {
            self.column_index(name)?;
        }
        Ok(())
    }

    /// Replace nulls in `column` with `value`; the column becomes non-null Utf8.
    pub fn fill_text(&mut self, column: &str, value: &str) -> Result<()> {
        let idx = self.column_index(column)?;
        let strings = self.utf8_column(idx)?;
        let filled: StringArray = strings.iter().map(|v| Some(v.unwrap_or(value))).collect();
        self.replace_column(idx, DataType::Utf8, false, Arc::new(filled))
    }

    /// Parse every cell of `column` as a float. Cells that do not parse, and
    /// cells that were already null, become null. Returns how many non-null
    /// cells failed to parse.
    pub fn coerce_numeric(&mut self, column: &str) -> Result<usize> {
        let idx = self.column_index(column)?;
        let strings = self.utf8_column(idx)?;

        let mut builder = Float64Builder::with_capacity(strings.len());
        let mut rejected = 0;
        for cell in strings.iter() {
            let parsed = cell.and_then(parse_number);
            if cell.is_some() && parsed.is_none() {
                rejected += 1;
            }
            builder.append_option(parsed);
        }

        debug!(column, rejected, "coerced to float64");
        self.replace_column(idx, DataType::Float64, true, Arc::new(builder.finish()))?;
        Ok(rejected)
    }

    /// Replace nulls in a Float64 `column` with `value`.
    pub fn fill_numeric(&mut self, column: &str, value: f64) -> Result<()> {
        let idx = self.column_index(column)?;
        let values = self
            .batch
            .column(idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| {
                Error::Internal(format!("column `{}` is not Float64; coerce it first", column))
            })?;
        let filled = Float64Array::from_iter_values(values.iter().map(|v| v.unwrap_or(value)));
        self.replace_column(idx, DataType::Float64, false, Arc::new(filled))
    }

    pub(crate) fn column_index(&self, name: &str) -> Result<usize> {
        self.batch
            .schema()
            .index_of(name)
            .map_err(|_| SchemaError::MissingColumn(name.to_string()).into())
    }

    /// The column at `idx`, cast to Utf8 if it is anything else.
    fn utf8_column(&self, idx: usize) -> Result<StringArray> {
        let col = self.batch.column(idx);
        let as_text: ArrayRef = if col.data_type() == &DataType::Utf8 {
            col.clone()
        } else {
            cast(col, &DataType::Utf8)
                .map_err(|e| Error::Internal(format!("casting column to Utf8: {}", e)))?
        };
        as_text
            .as_any()
            .downcast_ref::<StringArray>()
            .cloned()
            .ok_or_else(|| Error::Internal("expected a Utf8 column".into()))
    }

    fn replace_column(
        &mut self,
        idx: usize,
        data_type: DataType,
        nullable: bool,
        array: ArrayRef,
    ) -> Result<()> {
        let schema = self.batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let name = fields[idx].name().clone();
        fields[idx] = Field::new(name, data_type, nullable);

        let mut columns = self.batch.columns().to_vec();
        columns[idx] = array;

        self.batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .map_err(|e| Error::Internal(format!("replacing column {}: {}", idx, e)))?;
        Ok(())
    }
}

/// Surrounding whitespace is ignored; NaN counts as unparseable.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn load(csv: &str) -> Result<Dataset> {
        Ok(Dataset::load(csv.as_bytes(), &LoadOptions::default())?)
    }

    fn text_column(ds: &Dataset, name: &str) -> Vec<Option<String>> {
        let idx = ds.column_index(name).unwrap();
        ds.batch()
            .column(idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
            .iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    fn float_column(ds: &Dataset, name: &str) -> Vec<Option<f64>> {
        let idx = ds.column_index(name).unwrap();
        ds.batch()
            .column(idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .iter()
            .collect()
    }

    #[test]
    fn normalizes_names() {
        assert_eq!(normalize_column_name("  Amount Committed "), "amount_committed");
        assert_eq!(normalize_column_name("GRANTEE"), "grantee");
        assert_eq!(normalize_column_name("Fiscal  Year"), "fiscal__year");
        assert_eq!(normalize_column_name("Tab\tName"), "tab\tname");
    }

    #[test]
    fn loads_header_and_rows_as_text() -> Result<()> {
        let ds = load("Grantee, Amount Committed\nAlice,100\nBob,not_a_number\n")?;
        assert_eq!(ds.num_rows(), 2);
        assert_eq!(ds.column_names(), vec!["Grantee", " Amount Committed"]);
        assert_eq!(
            text_column(&ds, " Amount Committed"),
            vec![Some("100".into()), Some("not_a_number".into())]
        );
        Ok(())
    }

    #[test]
    fn empty_cells_and_null_tokens_are_absent() -> Result<()> {
        let ds = load("grantee,amount\n,1\nNA,2\nnull,3\nNAB,4\n")?;
        assert_eq!(
            text_column(&ds, "grantee"),
            vec![None, None, None, Some("NAB".into())]
        );
        Ok(())
    }

    #[test]
    fn custom_null_tokens_replace_defaults() -> Result<()> {
        let options = LoadOptions {
            null_values: null_regex(["", "-"])?,
            ..LoadOptions::default()
        };
        let ds = Dataset::load(b"grantee\n-\nNA\n\"\"\n", &options)?;
        assert_eq!(text_column(&ds, "grantee"), vec![None, Some("NA".into()), None]);
        Ok(())
    }

    #[test]
    fn header_only_input_has_zero_rows() -> Result<()> {
        let ds = load("grantee,amount_committed\n")?;
        assert_eq!(ds.num_rows(), 0);
        assert_eq!(ds.column_names().len(), 2);
        Ok(())
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        let err = Dataset::load(b"", &LoadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn overlong_row_is_a_parse_error() {
        let err = Dataset::load(b"a,b\n1,2,3\n", &LoadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let err = Dataset::load(b"a,b\n\xff\xfe,1\n", &LoadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn short_rows_are_padded() -> Result<()> {
        let ds = load("grantee,amount_committed\nAlice\n")?;
        assert_eq!(ds.num_rows(), 1);
        assert_eq!(text_column(&ds, "amount_committed"), vec![None]);
        Ok(())
    }

    #[test]
    fn bom_is_stripped() -> Result<()> {
        let ds = Dataset::load(b"\xEF\xBB\xBFGrantee,x\nA,1\n", &LoadOptions::default())?;
        assert_eq!(ds.column_names()[0], "Grantee");
        Ok(())
    }

    #[test]
    fn blank_header_cells_get_placeholder_names() -> Result<()> {
        let mut ds = load("grantee,,amount_committed,\nA,,1,\n")?;
        ds.normalize_column_names()?;
        assert_eq!(
            ds.column_names(),
            vec!["grantee", "unnamed:_1", "amount_committed", "unnamed:_3"]
        );
        Ok(())
    }

    #[test]
    fn colliding_names_are_a_schema_error() -> Result<()> {
        let mut ds = load("Amount Committed,amount committed\n1,2\n")?;
        let err = ds.normalize_column_names().unwrap_err();
        assert_eq!(err.kind(), "SchemaError");
        match err {
            Error::Schema(SchemaError::DuplicateColumn {
                normalized,
                first,
                second,
            }) => {
                assert_eq!(normalized, "amount_committed");
                assert_eq!(first, "Amount Committed");
                assert_eq!(second, "amount committed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(ds.column_names()[0], "Amount Committed");
        Ok(())
    }

    #[test]
    fn fill_text_replaces_nulls() -> Result<()> {
        let mut ds = load("grantee,n\nAlice,1\n,2\n")?;
        ds.fill_text("grantee", "Unknown")?;
        assert_eq!(
            text_column(&ds, "grantee"),
            vec![Some("Alice".into()), Some("Unknown".into())]
        );
        let schema = ds.batch().schema();
        let field = schema.field(0);
        assert!(!field.is_nullable());
        Ok(())
    }

    #[test]
    fn coerce_then_fill_numeric() -> Result<()> {
        let mut ds = load("id,amount_committed\n1,100\n2, not_a_number\n3,\n4, 2.5 \n5,NaN\n6,1e3\n")?;
        let rejected = ds.coerce_numeric("amount_committed")?;
        assert_eq!(rejected, 1);
        assert_eq!(
            float_column(&ds, "amount_committed"),
            vec![Some(100.0), None, None, Some(2.5), None, Some(1000.0)]
        );

        ds.fill_numeric("amount_committed", 0.0)?;
        assert_eq!(
            float_column(&ds, "amount_committed"),
            vec![Some(100.0), Some(0.0), Some(0.0), Some(2.5), Some(0.0), Some(1000.0)]
        );
        Ok(())
    }

    #[test]
    fn fill_numeric_requires_coercion() -> Result<()> {
        let mut ds = load("amount_committed\n1\n")?;
        let err = ds.fill_numeric("amount_committed", 0.0).unwrap_err();
        assert_eq!(err.kind(), "InternalError");
        Ok(())
    }

    #[test]
    fn missing_column_is_a_schema_error() -> Result<()> {
        let mut ds = load("grantee\nAlice\n")?;
        let err = ds.coerce_numeric("amount_committed").unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::MissingColumn(ref c)) if c == "amount_committed"
        ));
        assert!(ds.require_columns(&["grantee"]).is_ok());
        assert!(ds.require_columns(&["grantee", "amount_committed"]).is_err());
        Ok(())
    }

    #[test]
    fn parse_number_edge_cases() {
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("-1.5e2"), Some(-150.0));
        assert_eq!(parse_number("1,000"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("nan"), None);
        assert_eq!(parse_number("inf"), Some(f64::INFINITY));
    }
}
