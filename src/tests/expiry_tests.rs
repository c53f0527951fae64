#[cfg(test)]
mod tests {
    use crate::candidate::{IKEV2, ProtocolPort, STEALTH};
    use crate::config::GOOD_PROTOCOL_TTL_MS;
    use crate::selector::SignalOrigin;
    use crate::test_helpers::TestHarness;
    use crate::utils::{MS_PER_HOUR, now_ms};

    #[test]
    fn test_stale_good_protocol_is_reset() {
        let harness = TestHarness::new();
        let stale = now_ms() - 13 * MS_PER_HOUR;
        harness
            .selector
            .record_good_protocol_at(ProtocolPort::new(STEALTH, "443"), stale);
        // The known-good pair leads, so it is the one that fails.
        harness.selector.on_connection_failed();
        assert!(harness.selector.snapshot_for_display()[2].state.is_failed());

        assert!(harness.selector.on_good_protocol_expiry_check());
        assert!(harness.selector.known_good().is_none());
        assert_eq!(harness.order(), vec!["WireGuard", "IKEv2", "Stealth"]);
        assert!(harness.selector.snapshot_for_display().iter().all(|e| !e.state.is_failed()));
        assert_eq!(harness.selector.current_signal().origin, SignalOrigin::Expiry);
        harness.check();
    }

    #[test]
    fn test_fresh_good_protocol_survives() {
        let harness = TestHarness::new();
        harness.selector.record_good_protocol(ProtocolPort::new(STEALTH, "443"));
        let seq = harness.selector.current_signal().seq;

        assert!(!harness.selector.on_good_protocol_expiry_check());
        assert_eq!(harness.selector.known_good(), Some(ProtocolPort::new(STEALTH, "443")));
        assert_eq!(harness.selector.current_signal().seq, seq);
    }

    #[test]
    fn test_expiry_boundary() {
        let harness = TestHarness::new();
        harness
            .selector
            .record_good_protocol_at(ProtocolPort::new(IKEV2, "500"), 10_000);

        assert!(!harness
            .selector
            .on_good_protocol_expiry_check_at(10_000 + GOOD_PROTOCOL_TTL_MS - 1));
        assert!(harness
            .selector
            .on_good_protocol_expiry_check_at(10_000 + GOOD_PROTOCOL_TTL_MS));
        // Nothing left to expire.
        assert!(!harness.selector.on_good_protocol_expiry_check_at(u64::MAX));
    }

    #[test]
    fn test_report_shows_expiry_time() {
        let harness = TestHarness::new();
        harness
            .selector
            .record_good_protocol_at(ProtocolPort::new(IKEV2, "500"), 1_000);

        let report = harness.selector.status_report();
        let known_good = report.known_good.unwrap();
        assert_eq!(known_good.pair, ProtocolPort::new(IKEV2, "500"));
        assert_eq!(
            known_good.expires_at.unwrap().timestamp_millis() as u64,
            1_000 + GOOD_PROTOCOL_TTL_MS
        );
    }
}
