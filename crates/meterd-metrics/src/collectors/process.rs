use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use meterd_common::error::{MeterdError, Result};

use crate::{counter::Counter, gauge::Gauge, labels::LabelVector, registry::MetricsRegistry};

/// Linux reports `/proc/<pid>/stat` CPU times in USER_HZ ticks, fixed at 100.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const USER_HZ: f64 = 100.0;

/// Default runtime samples for the current process, refreshed on demand.
pub struct ProcessMetrics {
    started_at: Instant,
    start_time_seconds: Arc<Gauge>,
    uptime_seconds: Arc<Gauge>,
    resident_memory_bytes: Arc<Gauge>,
    virtual_memory_bytes: Arc<Gauge>,
    threads: Arc<Gauge>,
    open_fds: Arc<Gauge>,
    max_fds: Arc<Gauge>,
    cpu_user_seconds_total: Arc<Counter>,
    cpu_system_seconds_total: Arc<Counter>,
    last_cpu: Mutex<CpuTimes>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CpuTimes {
    user_seconds: f64,
    system_seconds: f64,
}

#[derive(Debug, Default, PartialEq)]
struct ProcessStatus {
    resident_bytes: Option<u64>,
    virtual_bytes: Option<u64>,
    threads: Option<u64>,
}

impl ProcessMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self> {
        Self::register_with_prefix(registry, "")
    }

    /// Registers every process metric with `prefix` prepended to its name.
    pub fn register_with_prefix(registry: &MetricsRegistry, prefix: &str) -> Result<Self> {
        let name = |suffix: &str| format!("{prefix}{suffix}");

        let metrics = Self {
            started_at: Instant::now(),
            start_time_seconds: registry.register_gauge(
                &name("process_start_time_seconds"),
                "Start time of the process since unix epoch in seconds",
                &[],
            )?,
            uptime_seconds: registry.register_gauge(
                &name("process_uptime_seconds"),
                "Process uptime in seconds",
                &[],
            )?,
            resident_memory_bytes: registry.register_gauge(
                &name("process_resident_memory_bytes"),
                "Resident memory size of the process in bytes",
                &[],
            )?,
            virtual_memory_bytes: registry.register_gauge(
                &name("process_virtual_memory_bytes"),
                "Virtual memory size of the process in bytes",
                &[],
            )?,
            threads: registry.register_gauge(
                &name("process_threads"),
                "Number of OS threads in the process",
                &[],
            )?,
            open_fds: registry.register_gauge(
                &name("process_open_fds"),
                "Number of open file descriptors",
                &[],
            )?,
            max_fds: registry.register_gauge(
                &name("process_max_fds"),
                "Maximum number of open file descriptors",
                &[],
            )?,
            cpu_user_seconds_total: registry.register_counter(
                &name("process_cpu_user_seconds_total"),
                "Total user CPU time spent in seconds",
                &[],
            )?,
            cpu_system_seconds_total: registry.register_counter(
                &name("process_cpu_system_seconds_total"),
                "Total system CPU time spent in seconds",
                &[],
            )?,
            last_cpu: Mutex::new(CpuTimes::default()),
        };

        metrics
            .start_time_seconds
            .set_to_current_time(&LabelVector::new())?;
        Ok(metrics)
    }

    /// Updates every sample from the operating system.
    pub fn refresh(&self) -> Result<()> {
        let none = LabelVector::new();
        self.uptime_seconds
            .set(&none, self.started_at.elapsed().as_secs_f64())?;
        self.refresh_os(&none)
    }

    #[cfg(target_os = "linux")]
    fn refresh_os(&self, none: &LabelVector) -> Result<()> {
        let status = parse_status(&std::fs::read_to_string("/proc/self/status")?);
        if let Some(bytes) = status.resident_bytes {
            self.resident_memory_bytes.set(none, bytes as f64)?;
        }
        if let Some(bytes) = status.virtual_bytes {
            self.virtual_memory_bytes.set(none, bytes as f64)?;
        }
        if let Some(threads) = status.threads {
            self.threads.set(none, threads as f64)?;
        }

        let open_fds = std::fs::read_dir("/proc/self/fd")?.count();
        self.open_fds.set(none, open_fds as f64)?;

        if let Some(max_fds) = parse_max_fds(&std::fs::read_to_string("/proc/self/limits")?) {
            self.max_fds.set(none, max_fds as f64)?;
        }

        if let Some(cpu) = parse_cpu_times(&std::fs::read_to_string("/proc/self/stat")?) {
            self.advance_cpu(none, cpu)?;
        }

        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn refresh_os(&self, _none: &LabelVector) -> Result<()> {
        Ok(())
    }

    /// Counters only move forward by the delta since the previous refresh.
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    fn advance_cpu(&self, none: &LabelVector, current: CpuTimes) -> Result<()> {
        let mut last = self
            .last_cpu
            .lock()
            .map_err(|_| MeterdError::poisoned("process cpu"))?;

        let user_delta = current.user_seconds - last.user_seconds;
        if user_delta > 0.0 {
            self.cpu_user_seconds_total.increment(none, user_delta)?;
            last.user_seconds = current.user_seconds;
        }

        let system_delta = current.system_seconds - last.system_seconds;
        if system_delta > 0.0 {
            self.cpu_system_seconds_total.increment(none, system_delta)?;
            last.system_seconds = current.system_seconds;
        }

        Ok(())
    }
}

/// Reads `VmRSS`, `VmSize` and `Threads` from `/proc/self/status`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_status(status: &str) -> ProcessStatus {
    let kib = |rest: &str| {
        rest.split_whitespace()
            .next()
            .and_then(|value| value.parse::<u64>().ok())
            .and_then(|kb| kb.checked_mul(1024))
    };

    let mut parsed = ProcessStatus::default();
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            parsed.resident_bytes = kib(rest);
        } else if let Some(rest) = line.strip_prefix("VmSize:") {
            parsed.virtual_bytes = kib(rest);
        } else if let Some(rest) = line.strip_prefix("Threads:") {
            parsed.threads = rest.trim().parse().ok();
        }
    }
    parsed
}

/// Soft limit of the `Max open files` row in `/proc/self/limits`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_max_fds(limits: &str) -> Option<u64> {
    limits
        .lines()
        .find_map(|line| line.strip_prefix("Max open files"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|soft| soft.parse().ok())
}

/// `utime` and `stime` (fields 14 and 15) of `/proc/self/stat`. The command
/// name may contain spaces, so fields are counted after its closing paren.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let mut fields = after_comm.split_whitespace().skip(11);
    let utime: f64 = fields.next()?.parse().ok()?;
    let stime: f64 = fields.next()?.parse().ok()?;

    Some(CpuTimes {
        user_seconds: utime / USER_HZ,
        system_seconds: stime / USER_HZ,
    })
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn parses_status_fields() {
        let status = "Name:\tmeterd\nVmSize:\t  20480 kB\nVmRSS:\t   1024 kB\nThreads:\t7\n";
        assert_eq!(
            parse_status(status),
            ProcessStatus {
                resident_bytes: Some(1024 * 1024),
                virtual_bytes: Some(20480 * 1024),
                threads: Some(7),
            }
        );
    }

    #[test]
    fn parses_max_open_files() {
        let limits = "Limit                     Soft Limit           Hard Limit           Units\n\
                      Max cpu time              unlimited            unlimited            seconds\n\
                      Max open files            1024                 524288               files\n";
        assert_eq!(parse_max_fds(limits), Some(1024));
    }

    #[test]
    fn parses_cpu_times_with_spaces_in_comm() {
        let stat = "4242 (my server) S 1 4242 4242 0 -1 4194560 100 0 0 0 250 50 0 0 20 0 4 0";
        assert_eq!(
            parse_cpu_times(stat),
            Some(CpuTimes {
                user_seconds: 2.5,
                system_seconds: 0.5,
            })
        );
    }

    #[test]
    fn cpu_counters_advance_by_delta() {
        let registry = MetricsRegistry::new();
        let metrics = ProcessMetrics::register(&registry).expect("register");
        let none = LabelVector::new();

        metrics
            .advance_cpu(&none, CpuTimes { user_seconds: 1.0, system_seconds: 0.5 })
            .expect("advance");
        metrics
            .advance_cpu(&none, CpuTimes { user_seconds: 1.5, system_seconds: 0.5 })
            .expect("advance");

        assert_eq!(metrics.cpu_user_seconds_total.value(&none).expect("value"), 1.5);
        assert_eq!(metrics.cpu_system_seconds_total.value(&none).expect("value"), 0.5);
    }

    #[test]
    fn refresh_sets_uptime_and_prefix_applies() {
        let registry = MetricsRegistry::new();
        let metrics = ProcessMetrics::register_with_prefix(&registry, "app_").expect("register");
        metrics.refresh().expect("refresh");

        assert!(registry.find("app_process_uptime_seconds").expect("find").is_some());
        assert!(registry.find("process_uptime_seconds").expect("find").is_none());
        let start = metrics
            .start_time_seconds
            .value(&LabelVector::new())
            .expect("value");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_secs_f64();
        assert!(start > 0.0 && start <= now);
    }
}
