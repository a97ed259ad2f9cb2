// Counters and timings for ETL runs. No exporter is installed here; a host
// process that wants them registers a `metrics` recorder.

use metrics::{counter, histogram};

use crate::domain::UploadStatus;

pub fn upload_finished(status: UploadStatus, duration_secs: f64) {
    counter!("catalog_intake_uploads_total", "status" => status.as_str()).increment(1);
    histogram!("catalog_intake_processing_duration_seconds").record(duration_secs);
}

pub fn rows_recorded(processed: usize, failed: usize) {
    counter!("catalog_intake_rows_processed_total").increment(processed as u64);
    counter!("catalog_intake_rows_failed_total").increment(failed as u64);
}

pub fn upload_rejected(reason: &'static str) {
    counter!("catalog_intake_uploads_rejected_total", "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{
        Counter, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString,
        Unit,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Samples(Mutex<Vec<f64>>);

    impl HistogramFn for Samples {
        fn record(&self, value: f64) {
            self.0.lock().unwrap().push(value);
        }
    }

    /// Keeps every counter and histogram by name plus sorted labels
    #[derive(Default)]
    struct CapturingRecorder {
        counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
        histograms: Mutex<HashMap<String, Arc<Samples>>>,
    }

    fn key_string(key: &Key) -> String {
        let mut labels: Vec<String> = key
            .labels()
            .map(|l| format!("{}={}", l.key(), l.value()))
            .collect();
        labels.sort();
        format!("{}{{{}}}", key.name(), labels.join(","))
    }

    impl CapturingRecorder {
        fn counter(&self, key: &str) -> u64 {
            self.counters
                .lock()
                .unwrap()
                .get(key)
                .map(|c| c.load(Ordering::SeqCst))
                .unwrap_or(0)
        }

        fn samples(&self, key: &str) -> usize {
            self.histograms
                .lock()
                .unwrap()
                .get(key)
                .map(|h| h.0.lock().unwrap().len())
                .unwrap_or(0)
        }
    }

    impl Recorder for CapturingRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            let counter = self
                .counters
                .lock()
                .unwrap()
                .entry(key_string(key))
                .or_default()
                .clone();
            Counter::from_arc(counter)
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
            let samples = self
                .histograms
                .lock()
                .unwrap()
                .entry(key_string(key))
                .or_default()
                .clone();
            Histogram::from_arc(samples)
        }
    }

    #[test]
    fn test_upload_metrics_are_recorded() {
        let recorder = CapturingRecorder::default();
        metrics::with_local_recorder(&recorder, || {
            upload_finished(UploadStatus::Completed, 0.25);
            upload_finished(UploadStatus::Completed, 0.5);
            upload_finished(UploadStatus::Failed, 0.1);
            rows_recorded(3, 1);
            rows_recorded(2, 0);
            upload_rejected("missing_category");
        });

        assert_eq!(recorder.counter("catalog_intake_uploads_total{status=COMPLETED}"), 2);
        assert_eq!(recorder.counter("catalog_intake_uploads_total{status=FAILED}"), 1);
        assert_eq!(recorder.counter("catalog_intake_rows_processed_total{}"), 5);
        assert_eq!(recorder.counter("catalog_intake_rows_failed_total{}"), 1);
        assert_eq!(
            recorder.counter("catalog_intake_uploads_rejected_total{reason=missing_category}"),
            1
        );
        assert_eq!(recorder.samples("catalog_intake_processing_duration_seconds{}"), 3);
    }
}
