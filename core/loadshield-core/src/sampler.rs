//! CPU utilization sampling.

use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

use crate::detector::Percentage;
use crate::error::SampleError;

#[async_trait]
pub trait Sampler: Send {
    async fn current_load(&mut self) -> Result<Percentage, SampleError>;
}

/// Global CPU usage from `sysinfo`.
///
/// Usage is computed between consecutive refreshes, so the reading taken at
/// construction only primes the counters.
pub struct SysinfoSampler {
    sys: System,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_cpu(CpuRefreshKind::new().with_cpu_usage()),
        );
        sys.refresh_cpu_specifics(CpuRefreshKind::new().with_cpu_usage());
        Self { sys }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SysinfoSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoSampler")
            .field("cpus", &self.sys.cpus().len())
            .finish()
    }
}

#[async_trait]
impl Sampler for SysinfoSampler {
    async fn current_load(&mut self) -> Result<Percentage, SampleError> {
        self.sys
            .refresh_cpu_specifics(CpuRefreshKind::new().with_cpu_usage());
        if self.sys.cpus().is_empty() {
            return Err(SampleError::Unavailable(
                "no CPU information reported by the host".to_string(),
            ));
        }
        to_percentage(self.sys.global_cpu_info().cpu_usage())
    }
}

/// Rounds a raw reading to whole percent, clamped to 0..=100.
pub fn to_percentage(raw: f32) -> Result<Percentage, SampleError> {
    if !raw.is_finite() {
        return Err(SampleError::InvalidReading(raw));
    }
    Ok(raw.round().clamp(0.0, 100.0) as Percentage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_and_clamps() {
        assert_eq!(to_percentage(42.4).expect("valid"), 42);
        assert_eq!(to_percentage(42.5).expect("valid"), 43);
        assert_eq!(to_percentage(-3.0).expect("valid"), 0);
        assert_eq!(to_percentage(180.0).expect("valid"), 100);
    }

    #[test]
    fn rejects_non_finite_readings() {
        assert!(matches!(
            to_percentage(f32::NAN),
            Err(SampleError::InvalidReading(_))
        ));
        assert!(to_percentage(f32::INFINITY).is_err());
    }

    #[tokio::test]
    async fn host_sampler_reports_a_percentage() {
        let mut sampler = SysinfoSampler::new();
        if let Ok(usage) = sampler.current_load().await {
            assert!(usage <= 100);
        }
    }
}
