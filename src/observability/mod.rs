//! Sync run metrics
//!
//! OpenTelemetry instruments for guide synchronization. The meter provider is
//! owned by [`GuideMetrics`] and handed to the sync context rather than
//! installed globally; exporters attach to the provider returned by
//! [`GuideMetrics::provider`].

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
use opentelemetry_sdk::metrics::SdkMeterProvider;

use crate::services::guide_sync::SyncReport;

#[derive(Clone)]
pub struct GuideMetrics {
    provider: SdkMeterProvider,
    pub meter: Meter,

    pub sync_runs: Counter<u64>,
    pub sync_failures: Counter<u64>,
    pub sync_duration: Histogram<f64>,
    pub stations_checked: Counter<u64>,
    pub station_days_refetched: Counter<u64>,
    pub programmes_produced: Counter<u64>,
    pub channel_state_failures: Counter<u64>,
}

impl GuideMetrics {
    pub fn new() -> Self {
        Self::with_provider(SdkMeterProvider::builder().build())
    }

    /// Build the instruments on a caller-configured provider (readers, exporters)
    pub fn with_provider(provider: SdkMeterProvider) -> Self {
        let meter = provider.meter("epg-gateway");

        let sync_runs = meter
            .u64_counter("guide_sync_runs_total")
            .with_description("Guide source synchronization runs")
            .build();
        let sync_failures = meter
            .u64_counter("guide_sync_failures_total")
            .with_description("Guide source synchronization runs that failed")
            .build();
        let sync_duration = meter
            .f64_histogram("guide_sync_duration_seconds")
            .with_description("Time taken to refresh and schedule a guide source")
            .build();
        let stations_checked = meter
            .u64_counter("guide_stations_checked_total")
            .with_description("Stations covered by change detection")
            .build();
        let station_days_refetched = meter
            .u64_counter("guide_station_days_refetched_total")
            .with_description("Station days whose schedule was downloaded again")
            .build();
        let programmes_produced = meter
            .u64_counter("guide_programmes_produced_total")
            .with_description("New or changed programmes handed to persistence")
            .build();
        let channel_state_failures = meter
            .u64_counter("guide_channel_state_failures_total")
            .with_description("Per-channel provider state writes that failed")
            .build();

        Self {
            provider,
            meter,
            sync_runs,
            sync_failures,
            sync_duration,
            stations_checked,
            station_days_refetched,
            programmes_produced,
            channel_state_failures,
        }
    }

    pub fn provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    pub fn record_success(&self, guide_source: &str, report: &SyncReport) {
        let attributes = [KeyValue::new("guide_source", guide_source.to_string())];
        self.sync_runs.add(1, &attributes);
        self.sync_duration.record(report.duration.as_secs_f64(), &attributes);
        self.stations_checked.add(report.stats.stations_checked as u64, &attributes);
        self.station_days_refetched
            .add(report.stats.station_days_fetched as u64, &attributes);
        self.programmes_produced.add(report.programmes_upserted as u64, &attributes);
        self.channel_state_failures
            .add(report.channel_state_failures.len() as u64, &attributes);
    }

    pub fn record_failure(&self, guide_source: &str) {
        let attributes = [KeyValue::new("guide_source", guide_source.to_string())];
        self.sync_runs.add(1, &attributes);
        self.sync_failures.add(1, &attributes);
    }
}

impl Default for GuideMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GuideMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuideMetrics").finish_non_exhaustive()
    }
}
