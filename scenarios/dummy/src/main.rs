use serde_json::{json, Value};
use std::time::{Duration, Instant};
use yardstick_runner::prelude::*;

/// Sleeps for `sleep_ms` per run and reports how long that took.
///
/// An `sla.max_latency_ms` threshold turns slow runs into SLA violations.
struct Dummy {
    max_latency_ms: Option<f64>,
}

impl Dummy {
    fn new(config: &ScenarioConfig) -> Self {
        Self {
            max_latency_ms: config
                .sla
                .as_ref()
                .and_then(|sla| sla.thresholds.get("max_latency_ms"))
                .and_then(Value::as_f64),
        }
    }

    fn measure(
        &self,
        options: &RecordData,
        data: &mut RecordData,
    ) -> YardstickResult<Option<RecordData>> {
        let sleep_ms = options.get("sleep_ms").and_then(Value::as_u64).unwrap_or(10);

        let started = Instant::now();
        std::thread::sleep(Duration::from_millis(sleep_ms));
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        data.insert("latency_ms".to_string(), json!(latency_ms));

        if let Some(max) = self.max_latency_ms {
            if latency_ms > max {
                return Err(SlaViolationError::new(format!(
                    "latency {latency_ms:.2}ms exceeds {max}ms"
                ))
                .into());
            }
        }

        Ok(None)
    }
}

impl Scenario for Dummy {
    fn setup(&mut self) -> YardstickResult<Option<Vec<u32>>> {
        log::info!("Dummy scenario ready");
        Ok(None)
    }

    fn run(&mut self, options: &RecordData, data: &mut RecordData) -> ScenarioOutcome {
        self.measure(options, data).into()
    }
}

/// A simulated link that forwards up to `capacity` packets per second.
///
/// Rates above capacity drop packets, which is an SLA violation. Useful to try out `Search`.
struct Throughput {
    capacity: f64,
}

impl Scenario for Throughput {
    fn run(&mut self, options: &RecordData, data: &mut RecordData) -> ScenarioOutcome {
        let Some(rate) = options.get("rate").and_then(Value::as_f64) else {
            return ScenarioOutcome::Fault(anyhow::anyhow!("Throughput needs a `rate` option"));
        };

        let achieved = rate.min(self.capacity);
        data.insert("achieved_rate".to_string(), json!(achieved));
        data.insert("dropped".to_string(), json!(rate - achieved));

        if rate > self.capacity {
            return ScenarioOutcome::SlaViolation(format!(
                "dropped {:.0} of {:.0} pps",
                rate - achieved,
                rate
            ));
        }

        let mut kpi = RecordData::new();
        kpi.insert("rx_pps".to_string(), json!(achieved));
        ScenarioOutcome::Completed(Some(kpi))
    }
}

fn main() -> YardstickResult<()> {
    let cli = init();

    let scenarios = ScenarioRegistry::new()
        .register("Dummy", |config| Ok(Box::new(Dummy::new(config))))
        .register("Throughput", |config| {
            let capacity = config
                .options
                .get("capacity")
                .and_then(Value::as_f64)
                .unwrap_or(1_000_000.0);
            Ok(Box::new(Throughput { capacity }))
        });

    let report = run(cli, scenarios)?;

    std::process::exit(report.status.exit_code());
}
