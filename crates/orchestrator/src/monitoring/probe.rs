//! Host resource sampling

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

/// Source of host utilisation figures, all in percent.
///
/// Implementations may block; callers run them on the blocking pool.
pub trait ResourceProbe: Send + Sync {
    fn cpu_percent(&self) -> f64;

    fn memory_percent(&self) -> f64;

    fn disk_percent(&self) -> f64;

    fn load_average(&self) -> f64 {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub load_average: f64,
}

impl MetricSnapshot {
    pub fn sample(probe: &dyn ResourceProbe) -> Self {
        Self {
            timestamp: Utc::now(),
            cpu_percent: probe.cpu_percent(),
            memory_percent: probe.memory_percent(),
            disk_percent: probe.disk_percent(),
            load_average: probe.load_average(),
        }
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

/// Probe backed by `sysinfo`
pub struct SysinfoProbe {
    sys: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        Self {
            sys: Mutex::new(sys),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    /// Average over all cores since the previous refresh
    fn cpu_percent(&self) -> f64 {
        let mut sys = self.sys.lock();
        sys.refresh_cpu_all();
        let cpus = sys.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64
    }

    fn memory_percent(&self) -> f64 {
        let mut sys = self.sys.lock();
        sys.refresh_memory();
        percent(sys.used_memory(), sys.total_memory())
    }

    fn disk_percent(&self) -> f64 {
        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks.iter().fold((0u64, 0u64), |(total, available), disk| {
            (total + disk.total_space(), available + disk.available_space())
        });
        percent(total.saturating_sub(available), total)
    }

    fn load_average(&self) -> f64 {
        System::load_average().one
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl ResourceProbe for Fixed {
        fn cpu_percent(&self) -> f64 {
            12.5
        }

        fn memory_percent(&self) -> f64 {
            40.0
        }

        fn disk_percent(&self) -> f64 {
            70.0
        }
    }

    #[test]
    fn test_sample_reads_every_figure() {
        let snapshot = MetricSnapshot::sample(&Fixed);
        assert_eq!(snapshot.cpu_percent, 12.5);
        assert_eq!(snapshot.memory_percent, 40.0);
        assert_eq!(snapshot.disk_percent, 70.0);
        assert_eq!(snapshot.load_average, 0.0);
    }

    #[test]
    fn test_percent_handles_empty_totals() {
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }

    #[test]
    fn test_sysinfo_probe_stays_in_range() {
        let probe = SysinfoProbe::new();
        let memory = probe.memory_percent();
        assert!((0.0..=100.0).contains(&memory));
        assert!(probe.cpu_percent() >= 0.0);
    }
}
