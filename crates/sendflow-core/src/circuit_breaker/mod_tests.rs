//! Tests for the circuit breaker registry.

use super::*;

fn registry_with_short_cool_down() -> CircuitBreakerRegistry {
    CircuitBreakerRegistry::new(BreakerConfig {
        failure_threshold: 5,
        cool_down: Duration::from_millis(50),
        half_open_success_quota: 3,
    })
}

#[test]
fn test_unknown_endpoint_is_closed() {
    let registry = CircuitBreakerRegistry::default();
    assert_eq!(registry.check("https://api.example.com/a"), CircuitState::Closed);
    assert_eq!(registry.open_count(), 0);
}

#[test]
fn test_endpoints_are_independent() {
    let registry = CircuitBreakerRegistry::default();
    for _ in 0..5 {
        registry.record_failure("https://a.example.com/x");
    }

    assert_eq!(registry.check("https://a.example.com/x"), CircuitState::Open);
    assert_eq!(registry.check("https://b.example.com/x"), CircuitState::Closed);
    assert_eq!(registry.open_count(), 1);
}

#[test]
fn test_states_snapshot() {
    let registry = CircuitBreakerRegistry::default();
    registry.record_failure("https://a.example.com/x");
    registry.record_success("https://b.example.com/y");

    let states = registry.states();
    assert_eq!(states["https://a.example.com/x"], CircuitState::Closed);
    assert_eq!(states["https://b.example.com/y"], CircuitState::Closed);
}

#[tokio::test]
async fn test_full_recovery_cycle() {
    let registry = registry_with_short_cool_down();
    let endpoint = "https://api.example.com/orders";

    for _ in 0..5 {
        registry.record_failure(endpoint);
    }
    assert_eq!(registry.check(endpoint), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(registry.check(endpoint), CircuitState::HalfOpen);

    for _ in 0..4 {
        registry.record_success(endpoint);
    }
    assert_eq!(registry.check(endpoint), CircuitState::Closed);
}

#[test]
fn test_snapshot_for_unknown_endpoint_is_none() {
    let registry = CircuitBreakerRegistry::default();
    assert!(registry.snapshot("https://nowhere.example.com").is_none());
}
