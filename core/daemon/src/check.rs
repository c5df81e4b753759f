//! `loadshield check`: one-shot connectivity test.
//!
//! Samples CPU, probes both remote APIs, reads the current security level, and
//! sends a test status update. Both probes always run; the level read and test
//! message only run once both pass. The first failure is the command's error.

use loadshield_core::{
    CloudflareClient, Notification, Notifier, Sampler, SecurityLevelClient, ShieldConfig,
    StartupError, SysinfoSampler, TelegramNotifier,
};
use std::time::Duration;
use tracing::{info, warn};

/// CPU usage is measured between two refreshes; this is the gap between them.
const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

pub async fn run(
    config: &ShieldConfig,
    security: &CloudflareClient,
    notifier: &TelegramNotifier,
) -> Result<(), StartupError> {
    let mut failures: Vec<StartupError> = Vec::new();

    let mut sampler = SysinfoSampler::new();
    tokio::time::sleep(SAMPLE_WINDOW).await;
    let usage = match sampler.current_load().await {
        Ok(usage) => {
            println!("CPU usage:            {usage}%");
            Some(usage)
        }
        Err(err) => {
            println!("CPU usage:            unavailable ({err})");
            None
        }
    };

    match security.probe().await {
        Ok(()) => println!("Cloudflare API:       ok"),
        Err(err) => {
            println!("Cloudflare API:       FAILED ({err})");
            failures.push(StartupError::Connectivity {
                service: "security level API",
                cause: err.to_string(),
            });
        }
    }

    match notifier.probe().await {
        Ok(()) => println!("Telegram API:         ok"),
        Err(err) => {
            println!("Telegram API:         FAILED ({err})");
            failures.push(StartupError::Connectivity {
                service: "notification API",
                cause: err.to_string(),
            });
        }
    }

    if failures.is_empty() {
        match security.get().await {
            Ok(level) => println!("Current level:        {}", level.display_name()),
            Err(err) => {
                println!("Current level:        unavailable ({err})");
                failures.push(StartupError::InitialPosture(err));
            }
        }

        let status = match usage {
            Some(usage) if usage > config.monitoring.cpu_threshold => "high (connection test)",
            Some(_) => "normal (connection test)",
            None => "unknown (connection test)",
        };
        let test_message = Notification::StatusUpdate {
            usage: usage.unwrap_or_default(),
            status: status.to_string(),
        };
        match notifier.send(&test_message).await {
            Ok(()) => println!("Test notification:    sent"),
            Err(err) => {
                warn!(error = %err, "Test notification failed");
                println!("Test notification:    FAILED ({err})");
            }
        }
    }

    println!();
    print_config(config);

    match failures.into_iter().next() {
        Some(err) => Err(err),
        None => {
            info!("Connection check passed");
            Ok(())
        }
    }
}

fn print_config(config: &ShieldConfig) {
    let monitoring = &config.monitoring;
    println!("Configuration:");
    println!("  CPU threshold:        {}%", monitoring.cpu_threshold);
    println!("  High CPU duration:    {}s", monitoring.high_cpu_duration_secs);
    println!("  Cooldown period:      {}s", monitoring.normal_cooldown_secs);
    println!("  Monitoring interval:  {}s", monitoring.monitoring_interval_secs);
    println!(
        "  Default level:        {}",
        config.cloudflare.default_security_level.display_name()
    );
    println!("  Zone ID:              {}", config.cloudflare.zone_id);
    println!("  Telegram chat:        {}", config.telegram.chat_id);
    if config.logging.log_to_file {
        println!(
            "  Log file:             {}",
            config.logging.log_file_path.display()
        );
    } else {
        println!("  Log file:             disabled");
    }
}
