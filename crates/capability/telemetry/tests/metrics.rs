use iot_telemetry::{metrics, record_auth_failure, record_bus_dispatched};

#[test]
fn counters_accumulate() {
    let before = metrics().snapshot();
    record_auth_failure();
    record_bus_dispatched(12);
    let after = metrics().snapshot();

    assert!(after.auth_failure >= before.auth_failure + 1);
    assert!(after.bus_dispatched >= before.bus_dispatched + 1);
    assert!(after.bus_dispatch_latency_ms_total >= before.bus_dispatch_latency_ms_total + 12);
}
