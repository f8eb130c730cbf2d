// src/handler.rs
use crate::{
    aggregate::{top_n_by_sum, Summary},
    error::{Error, Result},
    store::ObjectStore,
    table::{Dataset, LoadOptions},
    trigger::TriggerDescriptor,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub const GRANTEE: &str = "grantee";
pub const AMOUNT_COMMITTED: &str = "amount_committed";
pub const UNKNOWN_GRANTEE: &str = "Unknown";
pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone)]
pub struct StepOptions {
    pub top_n: usize,
    pub load: LoadOptions,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            load: LoadOptions::default(),
        }
    }
}

/// What the invoker gets back, success or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub body: String,
}

impl Response {
    pub fn success(summary: &Summary) -> Self {
        Self {
            status_code: 200,
            body: summary.to_string(),
        }
    }

    pub fn failure(err: &Error) -> Self {
        Self {
            status_code: 500,
            body: format!("{}: {}", err.kind(), err),
        }
    }
}

/// Load, clean and aggregate one object's bytes.
pub fn run_pipeline(data: &[u8], options: &StepOptions) -> Result<Summary> {
    let mut dataset = Dataset::load(data, &options.load)?;
    dataset.normalize_column_names()?;
    dataset.require_columns(&[GRANTEE, AMOUNT_COMMITTED])?;

    dataset.fill_text(GRANTEE, UNKNOWN_GRANTEE)?;
    dataset.coerce_numeric(AMOUNT_COMMITTED)?;
    dataset.fill_numeric(AMOUNT_COMMITTED, 0.0)?;

    let top = top_n_by_sum(&dataset, GRANTEE, AMOUNT_COMMITTED, options.top_n)?;
    Ok(Summary {
        rows: dataset.num_rows(),
        top_n: options.top_n,
        top,
    })
}

/// Fetch the triggering object and run the pipeline over it on the blocking pool.
#[tracing::instrument(level = "info", skip(store, options), fields(source = %trigger))]
pub async fn process<S: ObjectStore>(
    store: &S,
    trigger: &TriggerDescriptor,
    options: &StepOptions,
) -> Result<Summary> {
    info!("Reading {}", trigger);

    let data = store
        .get_object(&trigger.bucket, &trigger.key)
        .await
        .map_err(|e| Error::Storage {
            location: trigger.to_string(),
            message: format!("{:#}", e),
        })?;

    let options = options.clone();
    let summary = tokio::task::spawn_blocking(move || run_pipeline(&data, &options))
        .await
        .map_err(|e| Error::Internal(format!("aggregation task failed: {}", e)))??;

    info!(rows = summary.rows, "Top {} grantees by funding (USD):", summary.top_n);
    for t in &summary.top {
        info!(grantee = %t.grantee, amount = t.amount, "top grantee");
    }
    Ok(summary)
}

/// Entry point for a raw notification event. Never fails: errors are turned
/// into a 500 response.
pub async fn handle_event<S: ObjectStore>(
    store: &S,
    event: &[u8],
    options: &StepOptions,
) -> Response {
    let result = match TriggerDescriptor::from_event_json(event) {
        Ok(trigger) => process(store, &trigger, options).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(summary) => Response::success(&summary),
        Err(e) => {
            error!(kind = e.kind(), "aggregation failed: {}", e);
            Response::failure(&e)
        }
    }
}
