//! Metric name constants.

use std::time::Duration;

use anyhow::Context;
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config;

pub const AUTH_MISSING: &str = "contentflag.auth.missing"; // Counter.

pub const FLAG_ADDED: &str = "contentflag.flag.added"; // Counter.
pub const FLAG_REJECTED: &str = "contentflag.flag.rejected"; // Counter.
pub const FLAG_RECALLED: &str = "contentflag.flag.recalled"; // Counter.

pub const STATUS_CHANGED: &str = "contentflag.status.changed"; // Counter.

/// Must be ran exactly once on startup. This will declare all of the instruments for `metrics`.
pub fn setup(config: Option<&config::MetricConfig>) -> anyhow::Result<()> {
    describe_counter!(
        AUTH_MISSING,
        "The number of flag requests made without an authenticated user."
    );

    describe_counter!(FLAG_ADDED, "The count of recorded flags.");
    describe_counter!(
        FLAG_REJECTED,
        "The count of flags refused by the limit or comment policy."
    );
    describe_counter!(FLAG_RECALLED, "The count of retracted flags.");

    describe_counter!(
        STATUS_CHANGED,
        "The count of moderation status changes on flagged content."
    );

    if let Some(config) = config {
        match config {
            config::MetricConfig::PrometheusPush(prometheus_config) => {
                PrometheusBuilder::new()
                    .with_push_gateway(
                        prometheus_config.url.clone(),
                        Duration::from_secs(10),
                        None,
                        None,
                    )
                    .context("failed to set up push gateway")?
                    .install()
                    .context("failed to install metrics exporter")?;
            }
        }
    }

    Ok(())
}
