//! Registry example demonstrating per-service breakers and health reporting.
//!
//! This example shows how to:
//! - Create breakers lazily through a registry
//! - Serve cached values when a dependency is down
//! - Watch forwarded events from every breaker
//! - Persist breaker state and report system health
//!
//! Run with: cargo run --example registry_health
//! Set RUST_LOG=callguard=debug for the full event log.

use callguard::mock::MockService;
use callguard::persistence::FilesystemPersistence;
use callguard::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("callguard=info")),
        )
        .init();

    println!("=== Breaker Registry Example ===\n");

    let state_dir = std::env::temp_dir().join("callguard-demo");
    let store = FilesystemPersistence::new(&state_dir)?;
    println!("Breaker state directory: {}\n", state_dir.display());

    let config = RegistryConfig::new().with_service(
        "weather",
        BreakerConfigOverrides::new()
            .failure_threshold(3)
            .reset_timeout(Duration::from_secs(2))
            .success_threshold(2)
            .retry_delay(Duration::from_millis(50)),
    );
    let registry = Arc::new(
        BreakerRegistry::builder()
            .with_config(config)
            .with_persistence(Arc::new(store))
            .build(),
    );

    // Print forwarded events as they arrive
    let mut events = registry.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BreakerEvent::StateChange {
                    service,
                    old_state,
                    new_state,
                    ..
                } => println!("  [event] {service}: {old_state} -> {new_state}"),
                BreakerEvent::Failure {
                    service,
                    consecutive_failures,
                    ..
                } => println!("  [event] {service}: failure #{consecutive_failures}"),
                _ => {}
            }
        }
    });

    let weather_api = MockService::new("weather").always_fail();
    let sms_gateway = MockService::new("sms");

    let weather = registry.get_breaker("weather", None);
    let sms = registry.get_breaker("sms", None);

    println!("Sending forecast requests to a failing provider...\n");
    for i in 1..=5 {
        let forecast = weather
            .execute_with_fallback(
                || weather_api.call(),
                || async { Ok("cached forecast: light rain".to_string()) },
            )
            .await;

        match forecast {
            Ok(value) => println!("Request #{i}: {value} (state = {})", weather.state()),
            Err(e) => println!("Request #{i}: failed: {e}"),
        }
    }

    match sms.execute(|| sms_gateway.call()).await {
        Ok(reply) => println!("\nSMS gateway: {reply}"),
        Err(e) => println!("\nSMS gateway failed: {e}"),
    }

    print_health(&registry);

    println!("\nWaiting for the weather circuit to allow a trial call...");
    tokio::time::sleep(Duration::from_millis(2100)).await;
    weather_api.set_failing(false);

    for i in 1..=2 {
        match weather.execute(|| weather_api.call()).await {
            Ok(value) => println!("Trial #{i}: {value} (state = {})", weather.state()),
            Err(e) => println!("Trial #{i}: {e}"),
        }
    }

    print_health(&registry);

    for (service, metrics) in registry.all_metrics() {
        println!(
            "{service}: {} requests, {} rejected, opened {} times, avg latency {:.1}ms",
            metrics.total_requests,
            metrics.rejected_requests,
            metrics.times_opened,
            metrics.average_latency_ms
        );
    }

    registry.destroy();
    watcher.abort();

    println!("\n=== Example Complete ===");
    Ok(())
}

fn print_health(registry: &BreakerRegistry) {
    let health = registry.system_health();
    println!(
        "\nSystem health: healthy={} unhealthy={}/{}",
        health.healthy, health.unhealthy_count, health.total
    );
    match serde_json::to_string_pretty(&health) {
        Ok(json) => println!("{json}"),
        Err(e) => println!("could not render health: {e}"),
    }
}
