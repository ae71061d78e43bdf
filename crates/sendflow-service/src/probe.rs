//! Host resource probe backed by sysinfo.

use async_trait::async_trait;
use sendflow_core::monitor::{SystemProbe, SystemSample};
use sysinfo::{Disks, Networks, System};
use tokio::sync::Mutex;

/// Samples CPU, memory, disk, and network usage for the monitor.
///
/// CPU usage needs two refreshes separated by a short interval; the probe
/// holds its own `System` handle behind an async mutex so the wait does
/// not block other tasks.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemProbe for SysinfoProbe {
    async fn sample(&self) -> Option<SystemSample> {
        let mut system = self.system.lock().await;
        system.refresh_cpu();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_cpu();
        system.refresh_memory();

        let cpu_percent = system.global_cpu_info().cpu_usage() as f64;

        let total_memory = system.total_memory();
        let available_memory = system.available_memory();
        let memory_percent = if total_memory > 0 {
            (total_memory.saturating_sub(available_memory)) as f64 / total_memory as f64 * 100.0
        } else {
            0.0
        };

        let disks = Disks::new_with_refreshed_list();
        let (disk_total, disk_available) = disks.iter().fold((0u64, 0u64), |(total, free), disk| {
            (total + disk.total_space(), free + disk.available_space())
        });
        let disk_percent = if disk_total > 0 {
            (disk_total.saturating_sub(disk_available)) as f64 / disk_total as f64 * 100.0
        } else {
            0.0
        };

        let networks = Networks::new_with_refreshed_list();
        let (bytes_sent, bytes_received) =
            networks.iter().fold((0u64, 0u64), |(sent, received), (_, data)| {
                (
                    sent + data.total_transmitted(),
                    received + data.total_received(),
                )
            });

        Some(SystemSample {
            cpu_percent,
            memory_percent,
            memory_available_bytes: available_memory,
            disk_percent,
            bytes_sent,
            bytes_received,
        })
    }
}
