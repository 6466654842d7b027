/// Source of the system load figure used by the adaptive algorithm.
///
/// Values are normalized: `0.0` is idle, `1.0` is every core busy.
pub trait LoadProbe: Send + Sync {
    fn load(&self) -> f64;
}

/// Constant load, the default when no probe is configured.
#[derive(Debug, Clone, Copy)]
pub struct FixedLoad(pub f64);

impl LoadProbe for FixedLoad {
    fn load(&self) -> f64 {
        self.0
    }
}

/// One-minute load average from `/proc/loadavg` divided by the CPU count.
/// Reads `0.0` where the file is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadAverage;

impl LoadProbe for LoadAverage {
    fn load(&self) -> f64 {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1) as f64;
        match std::fs::read_to_string("/proc/loadavg") {
            Ok(raw) => parse_loadavg(&raw).map(|l| l / cpus).unwrap_or(0.0),
            Err(e) => {
                tracing::debug!(error = %e, "load average unavailable");
                0.0
            }
        }
    }
}

fn parse_loadavg(raw: &str) -> Option<f64> {
    raw.split_whitespace().next()?.parse().ok()
}

/// Effective limit under `load`: halved above 0.8, three quarters above 0.6,
/// never below one request.
pub fn adaptive_limit(max_requests: u32, load: f64) -> u32 {
    let factor = if load > 0.8 {
        0.5
    } else if load > 0.6 {
        0.75
    } else {
        1.0
    };
    ((max_requests as f64 * factor).floor() as u32).max(1)
}
