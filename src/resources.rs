//! Process resource sampling.
//!
//! Running scans periodically record CPU, memory and disk figures for the process.
//! Sampling is best effort: a failed read is logged at debug level and the last
//! good values (or zeros) are recorded instead.

use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One resource sample as recorded against a scan.
///
/// `concurrent_tasks` and `network_bytes` are scan-level figures the orchestrator
/// fills in; samplers report process-level CPU, memory and disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub concurrent_tasks: usize,
    pub network_bytes: u64,
    pub disk_bytes: u64,
}

/// Source of process resource figures.
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> Result<ResourceSample>;
}

/// Linux `USER_HZ`; `/proc/<pid>/stat` CPU times are reported in these ticks.
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// Samples the current process through `/proc/self`.
///
/// CPU percent is computed from the CPU time consumed since the previous sample, so
/// the first sample reports 0.
pub struct ProcessSampler {
    last_cpu: Mutex<Option<(Instant, f64)>>,
    last_good: Mutex<ResourceSample>,
}

impl ProcessSampler {
    pub fn new() -> Self {
        ProcessSampler {
            last_cpu: Mutex::new(None),
            last_good: Mutex::new(ResourceSample::default()),
        }
    }

    fn read_sample(&self) -> Result<ResourceSample> {
        let status = std::fs::read_to_string("/proc/self/status")
            .context("Failed to read /proc/self/status")?;
        let memory_mb = parse_vm_rss_kb(&status)
            .context("VmRSS missing from /proc/self/status")? as f64
            / 1024.0;

        let stat =
            std::fs::read_to_string("/proc/self/stat").context("Failed to read /proc/self/stat")?;
        let cpu_secs = parse_cpu_seconds(&stat).context("Malformed /proc/self/stat")?;
        let cpu_percent = self.cpu_percent(cpu_secs);

        // Not every kernel exposes io accounting
        let disk_bytes = std::fs::read_to_string("/proc/self/io")
            .ok()
            .and_then(|io| parse_io_bytes(&io))
            .unwrap_or(0);

        Ok(ResourceSample {
            cpu_percent,
            memory_mb,
            disk_bytes,
            ..ResourceSample::default()
        })
    }

    fn cpu_percent(&self, cpu_secs: f64) -> f64 {
        let now = Instant::now();
        let mut last = self.last_cpu.lock().unwrap_or_else(|e| e.into_inner());
        let percent = match *last {
            Some((at, prev_secs)) => {
                let wall = now.duration_since(at).as_secs_f64();
                if wall > 0.0 {
                    ((cpu_secs - prev_secs) / wall * 100.0).max(0.0)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        *last = Some((now, cpu_secs));
        percent
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for ProcessSampler {
    fn sample(&self) -> Result<ResourceSample> {
        match self.read_sample() {
            Ok(sample) => {
                *self.last_good.lock().unwrap_or_else(|e| e.into_inner()) = sample;
                Ok(sample)
            }
            Err(e) => {
                log::debug!("Resource sampling failed, reusing last sample: {:#}", e);
                Ok(*self.last_good.lock().unwrap_or_else(|e| e.into_inner()))
            }
        }
    }
}

fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}

/// utime + stime in seconds. Fields are counted after the parenthesised command name,
/// which may itself contain spaces.
fn parse_cpu_seconds(stat: &str) -> Option<f64> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // After the command name: state is field 3, utime 14, stime 15
    let utime: f64 = fields.get(11)?.parse().ok()?;
    let stime: f64 = fields.get(12)?.parse().ok()?;
    Some((utime + stime) / CLOCK_TICKS_PER_SEC)
}

fn parse_io_bytes(io: &str) -> Option<u64> {
    let field = |name: &str| -> Option<u64> {
        io.lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split(':').nth(1))
            .and_then(|v| v.trim().parse().ok())
    };
    Some(field("read_bytes:")? + field("write_bytes:")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tapi_sentinel\nVmPeak:\t  20000 kB\nVmRSS:\t   10240 kB\n";
        assert_eq!(parse_vm_rss_kb(status), Some(10240));
        assert_eq!(parse_vm_rss_kb("Name:\tx\n"), None);
    }

    #[test]
    fn test_parse_cpu_seconds_with_spaces_in_command() {
        let stat = "4242 (tokio runtime) S 1 4242 4242 0 -1 4194560 1000 0 0 0 250 50 0 0 20 0 8";
        assert_eq!(parse_cpu_seconds(stat), Some(3.0));
        assert_eq!(parse_cpu_seconds("garbage"), None);
    }

    #[test]
    fn test_parse_io_bytes() {
        let io = "rchar: 1\nwchar: 2\nread_bytes: 4096\nwrite_bytes: 8192\n";
        assert_eq!(parse_io_bytes(io), Some(12288));
        assert_eq!(parse_io_bytes("rchar: 1\n"), None);
    }

    #[test]
    fn test_sampler_never_errors() {
        let sampler = ProcessSampler::new();
        let first = sampler.sample().unwrap();
        assert_eq!(first.cpu_percent, 0.0);
        assert!(sampler.sample().is_ok());
    }
}
