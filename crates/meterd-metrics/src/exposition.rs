//! Prometheus text exposition format (version 0.0.4).

use meterd_common::error::{MeterdError, Result};

use crate::types::{CollectedMetric, MetricSample, MetricValue};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Renders collected metrics. Fails instead of emitting output that breaks
/// the counter or cumulative-bucket guarantees.
pub fn render(metrics: &[CollectedMetric]) -> Result<String> {
    let mut output = String::new();

    for metric in metrics {
        let name = &metric.descriptor.name;

        output.push_str("# HELP ");
        output.push_str(name);
        output.push(' ');
        output.push_str(&escape_help(&metric.descriptor.help));
        output.push('\n');

        output.push_str("# TYPE ");
        output.push_str(name);
        output.push(' ');
        output.push_str(metric.descriptor.metric_type.as_prometheus_type());
        output.push('\n');

        for sample in &metric.samples {
            render_sample(&mut output, name, sample)?;
        }
    }

    Ok(output)
}

fn render_sample(output: &mut String, name: &str, sample: &MetricSample) -> Result<()> {
    match &sample.value {
        MetricValue::Counter(value) => {
            if value.is_nan() || *value < 0.0 {
                return Err(MeterdError::Internal(format!(
                    "counter {name} holds invalid value {value}"
                )));
            }
            output.push_str(&render_sample_line(name, &sample.labels, *value));
        }
        MetricValue::Gauge(value) => {
            output.push_str(&render_sample_line(name, &sample.labels, *value));
        }
        MetricValue::Histogram {
            buckets,
            count,
            sum,
        } => {
            check_cumulative(name, buckets, *count)?;

            let bucket_name = format!("{name}_bucket");
            for (bound, bucket_count) in buckets {
                let mut labels = sample.labels.clone();
                labels.push(("le".to_string(), format_value(*bound)));
                output.push_str(&render_sample_line(&bucket_name, &labels, *bucket_count as f64));
            }
            let mut labels = sample.labels.clone();
            labels.push(("le".to_string(), "+Inf".to_string()));
            output.push_str(&render_sample_line(&bucket_name, &labels, *count as f64));

            output.push_str(&render_sample_line(&format!("{name}_sum"), &sample.labels, *sum));
            output.push_str(&render_sample_line(
                &format!("{name}_count"),
                &sample.labels,
                *count as f64,
            ));
        }
        MetricValue::Summary { count, sum } => {
            output.push_str(&render_sample_line(&format!("{name}_sum"), &sample.labels, *sum));
            output.push_str(&render_sample_line(
                &format!("{name}_count"),
                &sample.labels,
                *count as f64,
            ));
        }
    }

    Ok(())
}

fn check_cumulative(name: &str, buckets: &[(f64, u64)], count: u64) -> Result<()> {
    if let Some(pair) = buckets.windows(2).find(|pair| pair[0].1 > pair[1].1) {
        return Err(MeterdError::Internal(format!(
            "histogram {name} bucket le={} holds {} but le={} holds {}",
            pair[0].0, pair[0].1, pair[1].0, pair[1].1
        )));
    }

    if let Some((bound, last)) = buckets.last()
        && *last > count
    {
        return Err(MeterdError::Internal(format!(
            "histogram {name} bucket le={bound} holds {last} above total count {count}"
        )));
    }

    Ok(())
}

fn render_sample_line(name: &str, labels: &[(String, String)], value: f64) -> String {
    let mut rendered = String::new();
    rendered.push_str(name);

    if !labels.is_empty() {
        rendered.push('{');
        for (index, (key, value)) in labels.iter().enumerate() {
            if index > 0 {
                rendered.push(',');
            }
            rendered.push_str(key);
            rendered.push_str("=\"");
            rendered.push_str(&escape_label_value(value));
            rendered.push('"');
        }
        rendered.push('}');
    }

    rendered.push(' ');
    rendered.push_str(&format_value(value));
    rendered.push('\n');
    rendered
}

/// Integral values print without a fraction; infinities and NaN use the
/// spellings scrapers expect.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MetricDescriptor, MetricSample};

    fn labels(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn renders_counter_block() {
        let metrics = vec![CollectedMetric {
            descriptor: MetricDescriptor::counter("jobs_total", "Jobs run", &["queue"]),
            samples: vec![MetricSample {
                labels: labels(&[("queue", "default")]),
                value: MetricValue::Counter(3.0),
            }],
        }];

        assert_eq!(
            render(&metrics).expect("render"),
            "# HELP jobs_total Jobs run\n\
             # TYPE jobs_total counter\n\
             jobs_total{queue=\"default\"} 3\n"
        );
    }

    #[test]
    fn unlabelled_sample_has_no_braces() {
        let metrics = vec![CollectedMetric {
            descriptor: MetricDescriptor::gauge("in_flight", "In flight", &[]),
            samples: vec![MetricSample {
                labels: Vec::new(),
                value: MetricValue::Gauge(-1.5),
            }],
        }];

        assert!(render(&metrics).expect("render").ends_with("\nin_flight -1.5\n"));
    }

    #[test]
    fn renders_histogram_lines() {
        let metrics = vec![CollectedMetric {
            descriptor: MetricDescriptor::histogram("latency_seconds", "Latency", &["route"], &[0.1, 1.0]),
            samples: vec![MetricSample {
                labels: labels(&[("route", "/hello")]),
                value: MetricValue::Histogram {
                    buckets: vec![(0.1, 1), (1.0, 2)],
                    count: 3,
                    sum: 2.75,
                },
            }],
        }];

        let text = render(&metrics).expect("render");
        let lines: Vec<_> = text.lines().skip(2).collect();
        assert_eq!(
            lines,
            vec![
                "latency_seconds_bucket{route=\"/hello\",le=\"0.1\"} 1",
                "latency_seconds_bucket{route=\"/hello\",le=\"1\"} 2",
                "latency_seconds_bucket{route=\"/hello\",le=\"+Inf\"} 3",
                "latency_seconds_sum{route=\"/hello\"} 2.75",
                "latency_seconds_count{route=\"/hello\"} 3",
            ]
        );
    }

    #[test]
    fn renders_summary_without_quantiles() {
        let metrics = vec![CollectedMetric {
            descriptor: MetricDescriptor::summary("size_bytes", "Size", &[]),
            samples: vec![MetricSample {
                labels: Vec::new(),
                value: MetricValue::Summary { count: 2, sum: 4.0 },
            }],
        }];

        let text = render(&metrics).expect("render");
        assert!(text.contains("# TYPE size_bytes summary\n"));
        assert!(text.contains("size_bytes_sum 4\n"));
        assert!(text.contains("size_bytes_count 2\n"));
        assert!(!text.contains("quantile"));
    }

    #[test]
    fn escapes_label_values_and_help() {
        let metrics = vec![CollectedMetric {
            descriptor: MetricDescriptor::counter("paths_total", "Paths with \\ and\nnewline", &["path"]),
            samples: vec![MetricSample {
                labels: labels(&[("path", "say \"hi\"\\now")]),
                value: MetricValue::Counter(1.0),
            }],
        }];

        let text = render(&metrics).expect("render");
        assert!(text.contains("# HELP paths_total Paths with \\\\ and\\nnewline\n"));
        assert!(text.contains("paths_total{path=\"say \\\"hi\\\"\\\\now\"} 1\n"));
    }

    #[test]
    fn rejects_inconsistent_state() {
        let decreasing = vec![CollectedMetric {
            descriptor: MetricDescriptor::histogram("h", "h", &[], &[0.1, 1.0]),
            samples: vec![MetricSample {
                labels: Vec::new(),
                value: MetricValue::Histogram {
                    buckets: vec![(0.1, 2), (1.0, 1)],
                    count: 2,
                    sum: 0.1,
                },
            }],
        }];
        assert!(matches!(render(&decreasing), Err(MeterdError::Internal(_))));

        let above_total = vec![CollectedMetric {
            descriptor: MetricDescriptor::histogram("h", "h", &[], &[1.0]),
            samples: vec![MetricSample {
                labels: Vec::new(),
                value: MetricValue::Histogram {
                    buckets: vec![(1.0, 5)],
                    count: 4,
                    sum: 1.0,
                },
            }],
        }];
        assert!(matches!(render(&above_total), Err(MeterdError::Internal(_))));

        let negative_counter = vec![CollectedMetric {
            descriptor: MetricDescriptor::counter("c_total", "c", &[]),
            samples: vec![MetricSample {
                labels: Vec::new(),
                value: MetricValue::Counter(-1.0),
            }],
        }];
        assert!(matches!(render(&negative_counter), Err(MeterdError::Internal(_))));
    }

    #[test]
    fn value_formatting() {
        assert_eq!(format_value(3.0), "3");
        assert_eq!(format_value(0.3), "0.3");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(f64::NAN), "NaN");
    }
}
